//! Flat row types persisted per compiled section.

use serde::Serialize;

/// One row of `sections`. Keyed by the section id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionRow {
    pub id: String,
    pub round: u8,
    pub state: String,
    pub region: String,
    pub municipality: String,
    pub zone: String,
    pub section: String,
    pub generation: String,
    pub phase: String,
    pub equipment_model: Option<String>,
    pub session_type: String,
    pub software_version: Option<String>,
    pub timezone_offset: i32,
    pub emitted_at: Option<String>,
    pub eligible_voters: u32,
    pub turnout: u32,
    pub released_by_code: u32,
    pub biometric_matches: u32,
    pub biometric_pct: Option<f64>,
    pub abstention_pct: Option<f64>,
    pub open_time: Option<String>,
    pub close_time: Option<String>,
    pub duration_minutes: Option<i64>,
    pub reboots: u32,
    pub log_errors: u32,
    pub operator_alerts: u32,
    pub logged_votes: u32,
    pub substitutions: u32,
    pub is_reserve: bool,
    pub has_issues: bool,
    pub n_issues: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueRow {
    pub section_id: String,
    pub seq: u32,
    pub code: String,
    pub severity: String,
    pub description: String,
    pub legal_basis: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteRow {
    pub section_id: String,
    pub election_id: u32,
    pub office: String,
    pub office_code: u32,
    pub vote_kind: String,
    pub candidate: Option<u32>,
    pub party: Option<u32>,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfficeTotalRow {
    pub section_id: String,
    pub election_id: u32,
    pub office: String,
    pub office_code: u32,
    pub turnout: u32,
    pub nominal: u64,
    pub blank: u64,
    pub null_votes: u64,
    pub party_list: u64,
    pub no_candidate: u64,
    pub total: u64,
}

/// Everything written for one section, in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionRecord {
    pub section: SectionRow,
    pub issues: Vec<IssueRow>,
    pub votes: Vec<VoteRow>,
    pub totals: Vec<OfficeTotalRow>,
}

impl SectionRecord {
    pub fn id(&self) -> &str {
        &self.section.id
    }
}
