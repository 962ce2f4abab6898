use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::normalize::round2;
use crate::records::AttendanceRow;

pub const DEFAULTER_THRESHOLD: f64 = 75.0;
pub const EXCELLENT_THRESHOLD: f64 = 90.0;
pub const RECENT_DAYS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Excellent,
    Good,
    Defaulter,
}

impl Band {
    pub fn for_percentage(pct: f64) -> Band {
        if pct >= EXCELLENT_THRESHOLD {
            Band::Excellent
        } else if pct >= DEFAULTER_THRESHOLD {
            Band::Good
        } else {
            Band::Defaulter
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Band::Excellent => "Excellent (90%+)",
            Band::Good => "Good (75-89%)",
            Band::Defaulter => "Defaulter (<75%)",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total_records: usize,
    pub total_students: usize,
    pub avg_attendance: f64,
    pub excellent_count: usize,
    pub good_count: usize,
    pub defaulter_count: usize,
}

pub fn summarize<'a, I>(records: I) -> Summary
where
    I: IntoIterator<Item = &'a AttendanceRow>,
{
    let mut out = Summary::default();
    let mut tickets = BTreeSet::new();
    let mut sum = 0.0;
    for r in records {
        out.total_records += 1;
        tickets.insert(r.ticket_no.as_str());
        sum += r.attendance_percentage;
        match Band::for_percentage(r.attendance_percentage) {
            Band::Excellent => out.excellent_count += 1,
            Band::Good => out.good_count += 1,
            Band::Defaulter => out.defaulter_count += 1,
        }
    }
    out.total_students = tickets.len();
    if out.total_records > 0 {
        out.avg_attendance = round2(sum / out.total_records as f64);
    }
    out
}

/// Per-period summaries keyed by period label, in lexicographic order.
pub fn monthly(records: &[AttendanceRow]) -> BTreeMap<String, Summary> {
    let mut groups: BTreeMap<&str, Vec<&AttendanceRow>> = BTreeMap::new();
    for r in records {
        groups.entry(r.month.as_str()).or_default().push(r);
    }
    groups
        .into_iter()
        .map(|(month, rows)| (month.to_string(), summarize(rows)))
        .collect()
}

pub fn months(records: &[AttendanceRow]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.month.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn defaulter_by_month(records: &[AttendanceRow]) -> BTreeMap<String, usize> {
    monthly(records)
        .into_iter()
        .map(|(m, s)| (m, s.defaulter_count))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Defaulter {
    pub ticket_no: String,
    pub name: Option<String>,
    pub avg_attendance: f64,
    pub records: usize,
}

/// Students with at least one record below the threshold, each with the mean
/// over all of their records. Ordered by ticket number.
pub fn defaulters(records: &[AttendanceRow]) -> Vec<Defaulter> {
    let flagged = records
        .iter()
        .filter(|r| Band::for_percentage(r.attendance_percentage) == Band::Defaulter)
        .map(|r| r.ticket_no.as_str())
        .collect::<BTreeSet<_>>();

    flagged
        .into_iter()
        .map(|ticket| {
            let mine = records
                .iter()
                .filter(|r| r.ticket_no == ticket)
                .collect::<Vec<_>>();
            let sum = mine.iter().map(|r| r.attendance_percentage).sum::<f64>();
            Defaulter {
                ticket_no: ticket.to_string(),
                name: mine.iter().find_map(|r| r.student_name.clone()),
                avg_attendance: round2(sum / mine.len() as f64),
                records: mine.len(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAverage {
    pub date: String,
    pub avg_attendance: f64,
    pub records: usize,
}

/// Mean percentage per calendar date of entry, most recent first.
pub fn recent_activity(records: &[AttendanceRow]) -> Vec<DailyAverage> {
    let mut by_day: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for r in records {
        let Some(day) = r.created_at.get(..10) else {
            continue;
        };
        let slot = by_day.entry(day).or_insert((0.0, 0));
        slot.0 += r.attendance_percentage;
        slot.1 += 1;
    }
    by_day
        .into_iter()
        .rev()
        .take(RECENT_DAYS)
        .map(|(date, (sum, n))| DailyAverage {
            date: date.to_string(),
            avg_attendance: round2(sum / n as f64),
            records: n,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSummary {
    pub ticket_no: String,
    pub summary: Summary,
    pub band: Option<Band>,
    pub is_defaulter: bool,
    pub lowest_month: Option<String>,
}

pub fn student_summary(records: &[AttendanceRow], ticket_no: &str) -> StudentSummary {
    let mine = records
        .iter()
        .filter(|r| r.ticket_no == ticket_no)
        .collect::<Vec<_>>();
    let summary = summarize(mine.iter().copied());
    let band = (summary.total_records > 0).then(|| Band::for_percentage(summary.avg_attendance));
    let lowest_month = mine
        .iter()
        .min_by(|a, b| a.attendance_percentage.total_cmp(&b.attendance_percentage))
        .map(|r| r.month.clone());
    StudentSummary {
        ticket_no: ticket_no.to_string(),
        is_defaulter: summary.defaulter_count > 0,
        summary,
        band,
        lowest_month,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub band_labels: Vec<&'static str>,
    pub band_counts: Vec<usize>,
    pub monthly_labels: Vec<String>,
    pub monthly_attendance: Vec<f64>,
    pub monthly_defaulter: Vec<usize>,
}

pub fn chart(overall: &Summary, per_month: &BTreeMap<String, Summary>) -> ChartData {
    ChartData {
        band_labels: [Band::Excellent, Band::Good, Band::Defaulter]
            .iter()
            .map(|b| b.label())
            .collect(),
        band_counts: vec![
            overall.excellent_count,
            overall.good_count,
            overall.defaulter_count,
        ],
        monthly_labels: per_month.keys().cloned().collect(),
        monthly_attendance: per_month.values().map(|s| s.avg_attendance).collect(),
        monthly_defaulter: per_month.values().map(|s| s.defaulter_count).collect(),
    }
}
