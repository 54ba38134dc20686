use roster_core::{AvailabilityFilter, FavoriteSet, Grid, GridCell, OperatingStatus, PartnerRecord, SheetTable, SortDirection, SortKey, Weekday, WithdrawnFilter, WithdrawnRecord};
use roster_search::{paginate, search_availability, search_withdrawn, Precondition};

fn s(v: &[&str]) -> Vec<String> { v.iter().map(|x| x.to_string()).collect() }

fn monday_partner(id: &str, name: &str, pref: &str, nine: &str, ten: &str) -> PartnerRecord {
    let mut grid = Grid::default();
    grid.set(Weekday::Mon, 9, GridCell::parse(nine));
    grid.set(Weekday::Mon, 10, GridCell::parse(ten));
    PartnerRecord { id: id.into(), name: name.into(), prefecture: pref.into(), status: OperatingStatus::Active, grid, ..Default::default() }
}

fn monday_filter() -> AvailabilityFilter {
    AvailabilityFilter {
        regions: vec!["東京都".into()],
        weekdays: vec![Weekday::Mon],
        hour_from: 9,
        hour_to: 10,
        statuses: vec![OperatingStatus::Active],
        ..Default::default()
    }
}

#[test]
fn free_monday_morning_is_included() {
    let rows = vec![monday_partner("1", "a", "東京都", "0", "0")];
    let out = search_availability(&rows, &monday_filter(), &FavoriteSet::new()).unwrap();
    assert_eq!(out.sorted, vec![0]);
}

#[test]
fn one_occupied_hour_excludes_the_day() {
    let rows = vec![monday_partner("1", "a", "東京都", "1", "0")];
    let out = search_availability(&rows, &monday_filter(), &FavoriteSet::new()).unwrap();
    assert!(out.sorted.is_empty());
    let strict = AvailabilityFilter { strict: true, ..monday_filter() };
    assert!(search_availability(&rows, &strict, &FavoriteSet::new()).unwrap().sorted.is_empty());
}

#[test]
fn region_mismatch_excludes() {
    let rows = vec![monday_partner("1", "a", "大阪府", "0", "0")];
    assert!(search_availability(&rows, &monday_filter(), &FavoriteSet::new()).unwrap().sorted.is_empty());
}

#[test]
fn favorites_only_skips_preconditions_but_gates_rows() {
    let rows = vec![monday_partner("1", "a", "大阪府", "1", "1"), monday_partner("2", "b", "沖縄県", "", "")];
    let f = AvailabilityFilter { favorites_only: true, ..Default::default() };
    assert!(search_availability(&rows, &f, &FavoriteSet::new()).unwrap().sorted.is_empty());
    let favs = FavoriteSet::from_ids(vec!["2".to_string()]);
    assert_eq!(search_availability(&rows, &f, &favs).unwrap().sorted, vec![1]);
}

#[test]
fn missing_weekday_is_rejected() {
    let f = AvailabilityFilter { weekdays: vec![], ..monday_filter() };
    assert_eq!(search_availability(&[], &f, &FavoriteSet::new()).unwrap_err(), Precondition::MissingWeekday);
}

#[test]
fn forty_five_matches_page_three() {
    let rows: Vec<PartnerRecord> = (0..45).map(|i| monday_partner(&i.to_string(), &format!("p{:02}", i), "東京都", "0", "0")).collect();
    let out = search_availability(&rows, &monday_filter(), &FavoriteSet::new()).unwrap();
    let (page, w) = paginate(&out.sorted, 20, 3);
    assert_eq!(w.total_pages, 3);
    assert_eq!(page.len(), 5);
    assert_eq!((w.start_index, w.end_index), (41, 45));
    assert_eq!(rows[page[0]].name, "p40");
}

#[test]
fn sheet_rows_flow_through_withdrawn_search() {
    let table = SheetTable::from_values(vec![
        s(&["SF_ID__c", "Name", "Now_Age__c", "Mailing State", "WithdrawalDate__c", "DeclineChangeDate__c", "Quit_Dai__c"]),
        s(&["W1", "古い", "30", "東京都", "2022-01-01", "", "【当社判断】その他"]),
        s(&["W2", "新しい", "45", "東京都", "", "2024-03-01", "【当社判断】その他"]),
        s(&["W3", "日付なし", "50", "東京都"]),
        s(&["W4", "大阪", "33", "大阪府", "2023-01-01"]),
    ]);
    let rows: Vec<WithdrawnRecord> = table.records();
    let f = WithdrawnFilter { regions: vec!["東京都".into()], ..Default::default() };
    let out = search_withdrawn(&rows, &f, &FavoriteSet::new());
    let ids: Vec<&str> = out.sorted.iter().map(|i| rows[*i].id.as_str()).collect();
    assert_eq!(ids, vec!["W2", "W1", "W3"]);

    let f = WithdrawnFilter { age_min: Some(40), reason_large: vec!["【当社判断】その他".into()], sort_key: SortKey::Age, sort_direction: SortDirection::Asc, ..Default::default() };
    let out = search_withdrawn(&rows, &f, &FavoriteSet::new());
    assert_eq!(out.sorted, vec![1]);
}
