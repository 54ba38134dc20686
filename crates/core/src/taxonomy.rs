//! Fixed withdrawal-reason option lists (large / medium / small).
//!
//! Medium options are long sentences; the picker groups them by the short
//! label in front of `（` and selecting a group selects every full value in it.

pub const REASON_LARGE: &[&str] = &[
    "【パートナー判断】稼働条件合わず",
    "【パートナー判断】事故・免停免取",
    "【パートナー判断】開業支援期間終了",
    "【パートナー判断】健康上の問題",
    "【パートナー判断】ロジクエストへの不満",
    "【パートナー判断】その他",
    "【当社判断】使いたくない",
    "【当社判断】その他",
];

pub const REASON_MEDIUM: &[&str] = &[
    "【リサイクル可】働き方（具体的な希望条件を詳細欄に）",
    "【リサイクル可】業務内容（具体的な希望条件を詳細欄に）",
    "【リサイクル可】車両積載・色など（具体的な内容を詳細欄に）",
    "【リサイクル可】収入面（具体的な希望条件を詳細欄に）",
    "【リサイクル可】家庭事情（どんな事情なのかを聞ければ詳細欄に）",
    "【リサイクル可】案件がない",
    "【リサイクル可】家業継承（業種・職種を詳細欄に）",
    "【リサイクル可】音信不通（状況を詳細欄に）",
    "【リサイクル可】復帰可能性あり（具体的な内容を詳細欄に）",
    "【リサイクル不可】復帰可能性なし（具体的な内容を詳細欄に）",
    "【リサイクル可】免停・免取・稼働意志あり（状況を詳細欄に）",
    "【リサイクル不可】免停・免取・稼働意志なし（状況を詳細欄に）",
    "【リサイクル可】荷主NG（NG理由を詳細欄に）",
    "【リサイクル不可】荷主NG（NG理由を詳細欄に）",
    "【リサイクル不可】本人死去（理由・病名を詳細欄に）",
    "【リサイクル不可】本人の自信喪失（具体的な内容を詳細欄に）",
    "【リサイクル不可】本人からのクレーム多（具体的な内容を詳細欄に）",
    "【リサイクル不可】人物的に難あり（具体的な内容を詳細欄に）",
    "【リサイクル不可】事故により廃車となった",
    "【リサイクル不可】荷主からのクレーム多発（具体的な内容を詳細欄に）",
    "【リサイクル不可】高齢のため引退",
    "【リサイクル可】その他（内容を詳細欄に）",
    "【リサイクル不可】その他（内容を詳細欄に）",
    "【リサイクル可】その他（具体的な内容を詳細欄に）",
    "【リサイクル不可】その他（具体的な内容を詳細欄に）",
];

pub const REASON_SMALL: &[&str] = &["離脱後は自己・他社稼働", "離脱後は転職", "離脱後は廃業", "離脱後は不明"];

/// Text before the first `（`.
pub fn short_label(full: &str) -> &str { full.split('（').next().unwrap_or(full) }

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonGroup {
    pub label: String,
    pub values: Vec<String>,
}

/// Medium options grouped by short label, in first-seen order.
pub fn medium_groups() -> Vec<ReasonGroup> {
    let mut out: Vec<ReasonGroup> = Vec::new();
    for full in REASON_MEDIUM {
        let label = short_label(full);
        match out.iter_mut().find(|g| g.label == label) {
            Some(g) => { if !g.values.iter().any(|v| v == full) { g.values.push(full.to_string()); } }
            None => out.push(ReasonGroup { label: label.to_string(), values: vec![full.to_string()] }),
        }
    }
    out
}

/// Add (or remove) every value of `group` from a medium selection.
pub fn toggle_group(selection: &mut Vec<String>, group: &ReasonGroup, on: bool) {
    if on {
        for v in &group.values { if !selection.contains(v) { selection.push(v.clone()); } }
    } else {
        selection.retain(|v| !group.values.contains(v));
    }
}
