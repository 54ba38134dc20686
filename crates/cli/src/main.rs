use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use roster_api::{
    display_lines, format_elapsed, format_executed_at, AvailabilitySession, HistoryApi, HistoryPanel, LocalHistoryApi, PageView, Recorder,
    Settings, WithdrawnSession, PAGE_KEY_WITHDRAWN,
};
use roster_core::{dates, taxonomy, AssignmentRecord, OperatingStatus, PartnerRecord, SortDirection, SortKey, Weekday, WithdrawnRecord};
use roster_persist::{self as persist, HistoryStore, KvStore, SqliteStore};
use roster_search::{LocationHierarchy, PageLink};
use roster_store::source::{RANGE_ASSIGNMENTS, RANGE_PARTNERS, RANGE_WITHDRAWN};
use roster_store::{load_areas, Dataset, JsonFileSource, RowSource};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "rosterctl", version, about = "Partner roster search")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Directory holding `{sheet}.json` dumps
    #[arg(long = "data-dir", env = "ROSTER_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// SQLite file for favorites, cached filters and history
    #[arg(long = "db", env = "ROSTER_DB_PATH", global = true)]
    db: Option<String>,

    /// Bearer token for the sheet and history collaborators
    #[arg(long = "token", env = "ROSTER_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// History user id (e-mail)
    #[arg(long = "user", env = "ROSTER_USER", global = true)]
    user: Option<String>,

    #[arg(long = "page-size", env = "ROSTER_PAGE_SIZE", global = true)]
    page_size: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Surface { Availability, Withdrawn }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Switch { On, Off }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Availability search over the partner sheet
    Search(SearchArgs),
    /// Search the withdrawn-partner sheet (recorded in history)
    Withdrawn(WithdrawnArgs),
    /// Search history of the withdrawn page
    History {
        #[command(subcommand)]
        action: HistoryCmd,
    },
    /// Favorites
    Fav {
        #[command(subcommand)]
        action: FavCmd,
    },
    /// Print the prefecture -> city master
    Areas {
        /// Only these prefectures
        #[arg(long = "pref")]
        prefs: Vec<String>,
    },
    /// Drop the stored session (token, user). Favorites and cached filters stay.
    Logout,
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[arg(long = "pref")]
    prefs: Vec<String>,
    #[arg(long = "city")]
    cities: Vec<String>,
    /// Weekday label (月..日); repeatable
    #[arg(long = "day")]
    days: Vec<String>,
    #[arg(long = "from", default_value_t = 0)]
    from: u8,
    #[arg(long = "to", default_value_t = 23)]
    to: u8,
    /// 稼働 / 未稼働 / other; defaults to both known statuses
    #[arg(long = "status")]
    statuses: Vec<String>,
    /// Every selected day must be free (default: any)
    #[arg(long = "strict", action = ArgAction::SetTrue)]
    strict: bool,
    #[arg(long = "age-min")]
    age_min: Option<u32>,
    #[arg(long = "age-max")]
    age_max: Option<u32>,
    /// Favorites only; skips the prefecture/weekday requirement
    #[arg(long = "fav-only", action = ArgAction::SetTrue)]
    fav_only: bool,
    /// Column or `favorite`
    #[arg(long = "sort")]
    sort: Option<String>,
    #[arg(long = "order")]
    order: Option<String>,
    #[arg(long = "page", default_value_t = 1)]
    page: usize,
    /// Also list each partner's active assignments
    #[arg(long = "assignments", action = ArgAction::SetTrue)]
    assignments: bool,
}

#[derive(Args, Debug)]
struct WithdrawnArgs {
    #[arg(long = "pref")]
    prefs: Vec<String>,
    #[arg(long = "city")]
    cities: Vec<String>,
    /// Large reason; repeatable
    #[arg(long = "dai")]
    dai: Vec<String>,
    /// Medium reason, full text or group label; repeatable
    #[arg(long = "chu")]
    chu: Vec<String>,
    #[arg(long = "sho")]
    sho: Vec<String>,
    #[arg(long = "age-min")]
    age_min: Option<u32>,
    #[arg(long = "age-max")]
    age_max: Option<u32>,
    #[arg(long = "keyword")]
    keyword: Option<String>,
    /// Substring of the withdrawal detail text
    #[arg(long = "detail")]
    detail: Option<String>,
    #[arg(long = "fav-only", action = ArgAction::SetTrue)]
    fav_only: bool,
    #[arg(long = "sort")]
    sort: Option<String>,
    #[arg(long = "order")]
    order: Option<String>,
    #[arg(long = "page", default_value_t = 1)]
    page: usize,
    /// Start from defaults instead of the cached filter
    #[arg(long = "reset", action = ArgAction::SetTrue)]
    reset: bool,
}

#[derive(Subcommand, Debug)]
enum HistoryCmd {
    /// List entries, newest first
    List,
    /// Toggle the favorite flag of an entry
    Favorite { id: String },
    /// Soft-delete an entry
    Delete { id: String },
    /// Restore an entry's criteria; runs the search unless auto-search is off
    Replay { id: String },
    /// Run the search on replay
    AutoSearch {
        #[arg(value_enum)]
        state: Switch,
    },
}

#[derive(Subcommand, Debug)]
enum FavCmd {
    Toggle {
        id: String,
        #[arg(long = "surface", value_enum, default_value_t = Surface::Availability)]
        surface: Surface,
    },
    List {
        #[arg(long = "surface", value_enum, default_value_t = Surface::Availability)]
        surface: Surface,
    },
}

fn init_tracing() {
    let env = std::env::var("ROSTER_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("ROSTER_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid ROSTER_METRICS_ADDR; expected host:port");
        }
    }
}

/// Environment first, then explicit flags.
fn settings(cli: &Cli) -> Settings {
    let mut s = Settings::from_env();
    if let Some(d) = &cli.data_dir { s.data_dir = d.clone(); }
    if let Some(p) = &cli.db { s.db_path = Some(p.clone()); }
    if let Some(t) = cli.token.as_deref().filter(|t| !t.is_empty()) { s.token = Some(t.to_string()); }
    if let Some(u) = cli.user.as_deref().filter(|u| !u.is_empty()) { s.user = Some(u.to_string()); }
    if let Some(n) = cli.page_size.filter(|n| *n > 0) { s.page_size = n; }
    s
}

fn open_store(s: &Settings) -> Result<Arc<SqliteStore>> {
    let store = match &s.db_path {
        Some(p) => SqliteStore::open(p)?,
        None => SqliteStore::open_default()?,
    };
    Ok(Arc::new(store))
}

async fn hierarchy(source: &dyn RowSource, token: Option<&str>) -> LocationHierarchy {
    match load_areas(source, token).await {
        Ok(h) => h,
        Err(e) => {
            warn!(error = %e, "area master unavailable; city selections are not checked");
            LocationHierarchy::default()
        }
    }
}

fn sort_args(sort: Option<&str>, order: Option<&str>) -> Option<(Option<SortKey>, Option<SortDirection>)> {
    if sort.is_none() && order.is_none() { return None; }
    Some((sort.map(SortKey::parse), order.and_then(SortDirection::parse)))
}

fn print_links(links: &[PageLink], current: usize) {
    if links.is_empty() { return; }
    let parts: Vec<String> = links
        .iter()
        .map(|l| match l {
            PageLink::Page(p) if *p == current => format!("[{}]", p),
            PageLink::Page(p) => p.to_string(),
            PageLink::Ellipsis => "…".to_string(),
        })
        .collect();
    println!("{}", parts.join(" "));
}

fn print_footer<R>(v: &PageView<R>) {
    let w = &v.window;
    println!("{}-{} / {}件  page {}/{}  ({})", w.start_index, w.end_index, w.count, w.current, w.total_pages, format_elapsed(v.elapsed_ms));
    print_links(&v.links, w.current);
}

fn age_text(age: Option<f64>) -> String { age.map(|a| format!("{}", a)).unwrap_or_else(|| "-".into()) }

fn print_partner(p: &PartnerRecord, fav: bool, assignments: &[AssignmentRecord]) {
    let today = dates::today();
    let expired = [p.license_expiry.as_ref(), p.insurance_expiry.as_ref(), p.inspection_expiry.as_ref()]
        .into_iter()
        .filter(|d| dates::is_expired(*d, today))
        .count();
    println!(
        "{}{}  {}  {}歳  {}  {}{}  最終稼働:{}{}",
        if fav { "★ " } else { "" },
        p.id,
        p.name,
        age_text(p.age),
        p.status.label(),
        p.prefecture,
        p.city,
        dates::display_or_none(p.last_worked.as_ref()),
        if expired > 0 { format!("  期限切れ:{}", expired) } else { String::new() },
    );
    for a in assignments {
        let time = match (&a.start_time, &a.end_time) {
            (Some(s), Some(e)) => format!("{}〜{}", dates::format_hm(s), dates::format_hm(e)),
            _ => "-".into(),
        };
        println!(
            "    - {} [{}] {} {}h 契約:{}{}",
            a.name,
            a.working_days_label(),
            time,
            a.duration_hours().map(|h| format!("{:.1}", h)).unwrap_or_else(|| "-".into()),
            a.contract_price.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            AssignmentRecord::unit_label(&a.contract_unit),
        );
    }
}

fn print_withdrawn(w: &WithdrawnRecord, fav: bool) {
    println!(
        "{}{}  {}  {}歳  {}  離脱:{}  {}",
        if fav { "★ " } else { "" },
        w.key,
        w.name,
        age_text(w.age),
        w.address_label(),
        dates::display_or_none(w.exit_date.as_ref()),
        w.reason_large,
    );
}

async fn cmd_search(s: &Settings, out: Output, args: SearchArgs) -> Result<()> {
    let store = open_store(s)?;
    let source: Arc<dyn RowSource> = Arc::new(JsonFileSource::new(&s.data_dir));
    let partners = Dataset::<PartnerRecord>::new("パートナー情報", RANGE_PARTNERS);
    let assignments = Dataset::<AssignmentRecord>::new("稼働中案件", RANGE_ASSIGNMENTS);
    let p_join = partners.spawn_load(Arc::clone(&source), s.token.clone());
    let a_join = assignments.spawn_load(Arc::clone(&source), s.token.clone());
    let areas = hierarchy(source.as_ref(), s.token.as_deref()).await;

    let mut session = AvailabilitySession::new(partners.handle(), assignments.handle(), store.clone(), s.page_size);
    session.set_hierarchy(areas);
    session.set_regions(args.prefs);
    let mut bad_days = Vec::new();
    session.update(|f| {
        f.sub_regions = args.cities;
        f.weekdays = args.days.iter().filter_map(|d| Weekday::from_label(d).or_else(|| { bad_days.push(d.clone()); None })).collect();
        f.hour_from = args.from.min(23);
        f.hour_to = args.to.min(23);
        if !args.statuses.is_empty() { f.statuses = args.statuses.iter().map(|st| OperatingStatus::from(st.as_str())).collect(); }
        f.strict = args.strict;
        f.age_min = args.age_min;
        f.age_max = args.age_max;
        f.favorites_only = args.fav_only;
    });
    if !bad_days.is_empty() { warn!(days = ?bad_days, "ignoring unknown weekday labels"); }

    p_join.await?;
    a_join.await?;
    session.check_loaded().map_err(|e| anyhow!(e.message().to_string()))?;
    if let Some((key, dir)) = sort_args(args.sort.as_deref(), args.order.as_deref()) {
        let key = key.unwrap_or_else(|| session.filter().sort_key.clone());
        let dir = dir.unwrap_or(session.filter().sort_direction);
        session.set_sort(key, dir);
    }
    session.search().map_err(|e| anyhow!(e.message().to_string()))?;
    let view = session.page(args.page);
    match out {
        Output::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        Output::Human => {
            for p in &view.rows {
                let assigned = if args.assignments { session.assignments_of(&p.id) } else { Vec::new() };
                print_partner(p, session.favorites().contains(&p.id), &assigned);
            }
            print_footer(&view);
        }
    }
    Ok(())
}

fn expand_medium(raw: &[String]) -> Vec<String> {
    let groups = taxonomy::medium_groups();
    let mut out = Vec::new();
    for r in raw {
        match groups.iter().find(|g| &g.label == r) {
            Some(g) => taxonomy::toggle_group(&mut out, g, true),
            None => {
                if !out.contains(r) { out.push(r.clone()); }
            }
        }
    }
    out
}

fn history_api(s: &Settings, store: &Arc<SqliteStore>) -> Arc<dyn HistoryApi> {
    Arc::new(LocalHistoryApi::new(store.clone() as Arc<dyn HistoryStore>, s.token.clone()))
}

/// Withdrawn session with its dataset loading in the background. Searches
/// requested before the load settles are deferred.
async fn withdrawn_session(s: &Settings, store: &Arc<SqliteStore>, reset: bool) -> Result<(WithdrawnSession, tokio::task::JoinHandle<roster_store::LoadStatus>)> {
    if reset { store.remove(persist::KEY_WITHDRAWN_FILTERS)?; }
    let source: Arc<dyn RowSource> = Arc::new(JsonFileSource::new(&s.data_dir));
    let ds = Dataset::<WithdrawnRecord>::new("離脱パートナー情報", RANGE_WITHDRAWN);
    let recorder = Recorder::new(history_api(s, store), s.user.clone(), PAGE_KEY_WITHDRAWN);
    let mut session = WithdrawnSession::new(ds.handle(), store.clone(), s.page_size).with_recorder(recorder);
    session.begin_load();
    let join = ds.spawn_load(Arc::clone(&source), s.token.clone());
    session.set_hierarchy(hierarchy(source.as_ref(), s.token.as_deref()).await);
    Ok((session, join))
}

/// Wait for the load, run the parked search, and let the history append land.
async fn finish_withdrawn(session: &mut WithdrawnSession, join: tokio::task::JoinHandle<roster_store::LoadStatus>) -> Result<Option<PageView<WithdrawnRecord>>> {
    join.await?;
    let view = session.on_data_ready();
    session.check_loaded().map_err(|e| anyhow!(e.message().to_string()))?;
    if let Some(h) = session.take_last_record() {
        if tokio::time::timeout(Duration::from_secs(5), h).await.is_err() { warn!("history append still pending at exit"); }
    }
    Ok(view)
}

fn print_withdrawn_view(session: &WithdrawnSession, view: &PageView<WithdrawnRecord>, out: Output) -> Result<()> {
    match out {
        Output::Json => println!("{}", serde_json::to_string_pretty(view)?),
        Output::Human => {
            println!("{}", session.keyword_summary());
            for w in &view.rows { print_withdrawn(w, session.favorites().contains(&w.key)); }
            print_footer(view);
        }
    }
    Ok(())
}

async fn cmd_withdrawn(s: &Settings, out: Output, args: WithdrawnArgs) -> Result<()> {
    let store = open_store(s)?;
    let (mut session, join) = withdrawn_session(s, &store, args.reset).await?;
    if !args.prefs.is_empty() { session.set_regions(args.prefs); }
    session.update(|f| {
        if !args.cities.is_empty() { f.sub_regions = args.cities; }
        if !args.dai.is_empty() { f.reason_large = args.dai; }
        if !args.chu.is_empty() { f.reason_medium = expand_medium(&args.chu); }
        if !args.sho.is_empty() { f.reason_small = args.sho; }
        if args.age_min.is_some() { f.age_min = args.age_min; }
        if args.age_max.is_some() { f.age_max = args.age_max; }
        if let Some(k) = args.keyword { f.keyword = k; }
        if let Some(d) = args.detail { f.detail_keyword = d; }
        if args.fav_only { f.favorites_only = true; }
    });
    if let Some((key, dir)) = sort_args(args.sort.as_deref(), args.order.as_deref()) {
        let key = key.unwrap_or_else(|| session.filter().sort_key.clone());
        let dir = dir.unwrap_or(session.filter().sort_direction);
        session.set_sort(key, dir);
    }
    // Data is still loading; this parks the request.
    let ran = match session.request_search() {
        Some(v) => Some(v),
        None => finish_withdrawn(&mut session, join).await?,
    };
    if ran.is_none() { return Err(anyhow!("search did not run")); }
    let view = session.page(args.page);
    print_withdrawn_view(&session, &view, out)
}

async fn cmd_history(s: &Settings, out: Output, action: HistoryCmd) -> Result<()> {
    let store = open_store(s)?;
    let api = history_api(s, &store);
    let mut panel = HistoryPanel::new(Arc::clone(&api), store.clone(), s.user.clone(), PAGE_KEY_WITHDRAWN);
    if s.user.is_none() { return Err(anyhow!("no user; set ROSTER_USER or --user")); }
    match action {
        HistoryCmd::List => {
            panel.load().await;
            if let Some(e) = panel.error() { return Err(anyhow!(e.to_string())); }
            match out {
                Output::Json => println!("{}", serde_json::to_string_pretty(panel.entries())?),
                Output::Human => {
                    if panel.entries().is_empty() { println!("検索履歴はまだありません"); }
                    for e in panel.entries() {
                        let r = &e.record;
                        println!(
                            "{} {} {}  件数: {}  処理時間: {}",
                            if r.favorite_flag { "★" } else { " " },
                            r.id,
                            format_executed_at(&r.executed_at),
                            r.result_count,
                            format_elapsed(r.elapsed_ms)
                        );
                        for line in display_lines(e) { println!("    {}", line); }
                    }
                }
            }
        }
        HistoryCmd::Favorite { id } => {
            panel.load().await;
            let on = panel.toggle_favorite(&id).await.map_err(|e| anyhow!(e.to_string()))?;
            println!("{} {}", id, if on { "★" } else { "☆" });
        }
        HistoryCmd::Delete { id } => {
            panel.load().await;
            panel.delete(&id).await.map_err(|e| anyhow!(e.to_string()))?;
            println!("deleted {}", id);
        }
        HistoryCmd::AutoSearch { state } => {
            let on = state == Switch::On;
            panel.set_auto_search(on);
            println!("auto-search {}", if on { "on" } else { "off" });
        }
        HistoryCmd::Replay { id } => {
            panel.load().await;
            let (mut session, join) = withdrawn_session(s, &store, false).await?;
            let ran = panel.select(&id, &mut session).map_err(|e| anyhow!(e.to_string()))?;
            if !panel.auto_search() {
                join.await?;
                println!("{}", session.keyword_summary());
                return Ok(());
            }
            let view = match ran {
                Some(v) => Some(v),
                None => finish_withdrawn(&mut session, join).await?,
            };
            match view {
                Some(v) => print_withdrawn_view(&session, &v, out)?,
                None => println!("{}", session.keyword_summary()),
            }
        }
    }
    Ok(())
}

fn cmd_fav(s: &Settings, out: Output, action: FavCmd) -> Result<()> {
    let store = open_store(s)?;
    let key = |surface: Surface| match surface {
        Surface::Availability => persist::KEY_FAVORITES,
        Surface::Withdrawn => persist::KEY_WITHDRAWN_FAVORITES,
    };
    match action {
        FavCmd::Toggle { id, surface } => {
            let mut favs = persist::load_favorites(store.as_ref(), key(surface));
            let on = favs.toggle(&id);
            persist::save_favorites(store.as_ref(), key(surface), &favs)?;
            println!("{} {}", id, if on { "★" } else { "☆" });
        }
        FavCmd::List { surface } => {
            let favs = persist::load_favorites(store.as_ref(), key(surface));
            match out {
                Output::Json => println!("{}", serde_json::to_string_pretty(favs.ids())?),
                Output::Human => favs.ids().iter().for_each(|id| println!("{}", id)),
            }
        }
    }
    Ok(())
}

async fn cmd_areas(s: &Settings, out: Output, prefs: Vec<String>) -> Result<()> {
    let source = JsonFileSource::new(&s.data_dir);
    let h = load_areas(&source, s.token.as_deref()).await?;
    let regions: Vec<&str> = h.regions().filter(|r| prefs.is_empty() || prefs.iter().any(|p| p.as_str() == *r)).collect();
    match out {
        Output::Json => {
            let m: serde_json::Map<String, serde_json::Value> = regions.iter().map(|r| (r.to_string(), serde_json::json!(h.sub_regions_of(r)))).collect();
            println!("{}", serde_json::to_string_pretty(&m)?);
        }
        Output::Human => {
            for r in regions { println!("{}: {}", r, h.sub_regions_of(r).join(", ")); }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let s = settings(&cli);
    let t0 = Instant::now();
    let name = match &cli.command {
        Commands::Search(_) => "search",
        Commands::Withdrawn(_) => "withdrawn",
        Commands::History { .. } => "history",
        Commands::Fav { .. } => "fav",
        Commands::Areas { .. } => "areas",
        Commands::Logout => "logout",
    };
    metrics::counter!("cli_commands_total", 1u64, "command" => name);
    info!(command = name, data_dir = %s.data_dir.display(), user = %s.user_display_name(), "rosterctl start");

    let res = match cli.command {
        Commands::Search(args) => cmd_search(&s, cli.output, args).await,
        Commands::Withdrawn(args) => cmd_withdrawn(&s, cli.output, args).await,
        Commands::History { action } => cmd_history(&s, cli.output, action).await,
        Commands::Fav { action } => cmd_fav(&s, cli.output, action),
        Commands::Areas { prefs } => cmd_areas(&s, cli.output, prefs).await,
        Commands::Logout => {
            let store = open_store(&s)?;
            persist::logout(store.as_ref())?;
            println!("logged out; favorites and cached filters kept");
            Ok(())
        }
    };
    info!(command = name, ok = res.is_ok(), took_ms = %t0.elapsed().as_millis(), "rosterctl done");
    res
}
