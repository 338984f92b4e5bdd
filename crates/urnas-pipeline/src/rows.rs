//! Flatten a decoded ballot plus collaborator data into store rows.

use urnas_core::catalog::{region_of, timezone_offset};
use urnas_core::{BallotRecord, Enrichment, LogEvents, Office, Section, SectionId};
use urnas_store::{IssueRow, OfficeTotalRow, SectionRecord, SectionRow, VoteRow};

/// Build the full row family for one section.
///
/// Eligible voters come from the first election block and turnout is the
/// highest turnout of any office. Missing log data yields zero counters.
pub fn flatten(
    id: &SectionId,
    section: &Section,
    record: &BallotRecord,
    enrichment: &Enrichment,
) -> SectionRecord {
    let key = id.as_str().to_string();
    let log = enrichment.log_events.clone().unwrap_or_default();
    let eligible = record.eligible_voters();
    let turnout = record.turnout();

    let issues: Vec<IssueRow> = enrichment
        .issues
        .iter()
        .enumerate()
        .map(|(seq, issue)| IssueRow {
            section_id: key.clone(),
            seq: u32::try_from(seq).unwrap_or(u32::MAX),
            code: issue.code.clone(),
            severity: issue.severity.as_str().to_string(),
            description: issue.description.clone(),
            legal_basis: issue.legal_basis.clone(),
            details: issue.details.clone(),
        })
        .collect();

    let mut votes = Vec::new();
    let mut totals = Vec::new();
    for election in &record.elections {
        for office in &election.offices {
            let name = office_name(office.office);
            votes.extend(office.votes.iter().map(|v| VoteRow {
                section_id: key.clone(),
                election_id: election.election_id,
                office: name.clone(),
                office_code: office.office.code(),
                vote_kind: v.kind.as_str().to_string(),
                candidate: v.candidate,
                party: v.party,
                quantity: v.quantity,
            }));
            let t = office.totals();
            totals.push(OfficeTotalRow {
                section_id: key.clone(),
                election_id: election.election_id,
                office: name,
                office_code: office.office.code(),
                turnout: office.turnout,
                nominal: t.nominal,
                blank: t.blank,
                null_votes: t.null,
                party_list: t.party_list,
                no_candidate: t.no_candidate,
                total: t.total,
            });
        }
    }

    let LogEvents {
        reboots,
        error_count,
        operator_alert_count,
        votes_logged,
        substitution_count,
        open_time,
        close_time,
        duration_minutes,
    } = log;

    let section_row = SectionRow {
        id: key,
        round: id.round(),
        state: section.state.clone(),
        region: region_of(&section.state).to_string(),
        municipality: section.municipality.clone(),
        zone: section.zone.clone(),
        section: section.section.clone(),
        generation: record.generation.as_str().to_string(),
        phase: record.phase.as_str().to_string(),
        equipment_model: enrichment.equipment_model.clone(),
        session_type: record.equipment.session_type.as_str().to_string(),
        software_version: record.equipment.software_version.clone(),
        timezone_offset: timezone_offset(&section.state),
        emitted_at: record.emitted_at.clone(),
        eligible_voters: eligible,
        turnout,
        released_by_code: record.released_by_code,
        biometric_matches: record.biometric_matches,
        biometric_pct: biometric_pct(record.released_by_code, record.biometric_matches),
        abstention_pct: abstention_pct(eligible, turnout),
        open_time: open_time.or_else(|| record.opened_at.clone()),
        close_time: close_time.or_else(|| record.closed_at.clone()),
        duration_minutes,
        reboots,
        log_errors: error_count,
        operator_alerts: operator_alert_count,
        logged_votes: votes_logged,
        substitutions: substitution_count,
        is_reserve: record.equipment.session_type.is_reserve(),
        has_issues: !issues.is_empty(),
        n_issues: u32::try_from(issues.len()).unwrap_or(u32::MAX),
    };

    SectionRecord {
        section: section_row,
        issues,
        votes,
        totals,
    }
}

/// Administrative identity recorded inside the ballot, for files found
/// outside the download layout.
pub fn section_from_ballot(record: &BallotRecord) -> Section {
    let id = &record.identity;
    Section::new(
        id.state.clone().unwrap_or_default(),
        format!("{:05}", id.municipality),
        format!("{:04}", id.zone),
        format!("{:04}", id.section),
    )
}

fn office_name(office: Office) -> String {
    office
        .wire_name()
        .map_or_else(|| office.label(), str::to_string)
}

/// Share of voters released by fingerprint, in percent with two decimals.
pub fn biometric_pct(released_by_code: u32, biometric: u32) -> Option<f64> {
    let total = u64::from(released_by_code) + u64::from(biometric);
    (total > 0).then(|| round2(f64::from(biometric) / total as f64 * 100.0))
}

pub fn abstention_pct(eligible: u32, turnout: u32) -> Option<f64> {
    (eligible > 0).then(|| {
        round2((f64::from(eligible) - f64::from(turnout)) / f64::from(eligible) * 100.0)
    })
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
