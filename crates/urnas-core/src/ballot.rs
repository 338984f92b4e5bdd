//! Decoded ballot record ("boletim de urna") and its closed enumerations.
//!
//! The wire format emits some fields either as a number or as a symbolic
//! name depending on firmware. Every enumeration here therefore has a
//! numeric constructor, a wire-name constructor, and an `Unknown` fallback
//! that keeps the raw code instead of failing the decode.

use serde::Serialize;

use crate::catalog;

/// Wire format generation. The authority changed the encoding between cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaGeneration {
    /// 2022 cycle (`.bu`, `.logjez`, ...).
    #[default]
    V1,
    /// 2024 cycle onwards (`-bu.dat`, `-log.jez`, ...).
    V2,
}

impl SchemaGeneration {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Simulated,
    #[default]
    Official,
    Training,
}

impl Phase {
    /// Anything outside the known range is treated as official.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Simulated,
            3 => Self::Training,
            _ => Self::Official,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Simulated => 1,
            Self::Official => 2,
            Self::Training => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simulated => "simulated",
            Self::Official => "official",
            Self::Training => "training",
        }
    }
}

/// How the machine that produced the ballot was used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// Regular machine for the section (`secao`).
    #[default]
    Ordinary,
    /// Contingency replacement (`contingencia`).
    Contingency,
    /// Reserve machine that took over the section (`reservaSecao`).
    Reserve,
    /// Reserve machine used only to close the section (`reservaEncerrandoSecao`).
    ReserveClosing,
    Unknown(i64),
}

impl SessionType {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Ordinary,
            3 => Self::Contingency,
            4 => Self::Reserve,
            6 => Self::ReserveClosing,
            other => Self::Unknown(other),
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        SESSION_NAMES
            .iter()
            .find(|(_, wire)| *wire == name)
            .map(|(kind, _)| *kind)
    }

    pub fn wire_name(self) -> Option<&'static str> {
        SESSION_NAMES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, wire)| *wire)
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Ordinary => 1,
            Self::Contingency => 3,
            Self::Reserve => 4,
            Self::ReserveClosing => 6,
            Self::Unknown(code) => code,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::Contingency => "contingency",
            Self::Reserve => "reserve",
            Self::ReserveClosing => "reserve_closing",
            Self::Unknown(_) => "unknown",
        }
    }

    pub fn is_reserve(self) -> bool {
        matches!(self, Self::Reserve)
    }
}

const SESSION_NAMES: &[(SessionType, &str)] = &[
    (SessionType::Ordinary, "secao"),
    (SessionType::Contingency, "contingencia"),
    (SessionType::Reserve, "reservaSecao"),
    (SessionType::ReserveClosing, "reservaEncerrandoSecao"),
];

/// Contested office. Codes follow the authority's numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Office {
    President,
    VicePresident,
    Governor,
    ViceGovernor,
    Senator,
    FederalDeputy,
    StateDeputy,
    DistrictDeputy,
    FirstAlternateSenator,
    SecondAlternateSenator,
    Mayor,
    ViceMayor,
    Councillor,
    Unknown(u32),
}

impl Office {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::President,
            2 => Self::VicePresident,
            3 => Self::Governor,
            4 => Self::ViceGovernor,
            5 => Self::Senator,
            6 => Self::FederalDeputy,
            7 => Self::StateDeputy,
            8 => Self::DistrictDeputy,
            9 => Self::FirstAlternateSenator,
            10 => Self::SecondAlternateSenator,
            11 => Self::Mayor,
            12 => Self::ViceMayor,
            13 => Self::Councillor,
            other => Self::Unknown(other),
        }
    }

    /// Resolve a symbolic wire name (`"deputadoFederal"`) through the catalog.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        catalog::office_code_for_name(name).map(Self::from_code)
    }

    pub fn wire_name(self) -> Option<&'static str> {
        catalog::office_wire_name(self.code())
    }

    pub fn code(self) -> u32 {
        match self {
            Self::President => 1,
            Self::VicePresident => 2,
            Self::Governor => 3,
            Self::ViceGovernor => 4,
            Self::Senator => 5,
            Self::FederalDeputy => 6,
            Self::StateDeputy => 7,
            Self::DistrictDeputy => 8,
            Self::FirstAlternateSenator => 9,
            Self::SecondAlternateSenator => 10,
            Self::Mayor => 11,
            Self::ViceMayor => 12,
            Self::Councillor => 13,
            Self::Unknown(code) => code,
        }
    }

    /// Display label as printed on the authority's reports.
    pub fn label(self) -> String {
        match catalog::office_label(self.code()) {
            Some(label) => label.to_string(),
            None => format!("Cargo {}", self.code()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteKind {
    Nominal,
    Blank,
    Null,
    PartyList,
    NoCandidate,
    Unknown(i64),
}

impl VoteKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Nominal,
            2 => Self::Blank,
            3 => Self::Null,
            4 => Self::PartyList,
            5 => Self::NoCandidate,
            other => Self::Unknown(other),
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        VOTE_KIND_NAMES
            .iter()
            .find(|(_, wire)| *wire == name)
            .map(|(kind, _)| *kind)
    }

    pub fn wire_name(self) -> Option<&'static str> {
        VOTE_KIND_NAMES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, wire)| *wire)
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Nominal => 1,
            Self::Blank => 2,
            Self::Null => 3,
            Self::PartyList => 4,
            Self::NoCandidate => 5,
            Self::Unknown(code) => code,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nominal => "nominal",
            Self::Blank => "blank",
            Self::Null => "null",
            Self::PartyList => "party_list",
            Self::NoCandidate => "no_candidate",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Nominal and party-list votes carry a candidate identification.
    pub fn has_candidate(self) -> bool {
        matches!(self, Self::Nominal | Self::PartyList)
    }
}

const VOTE_KIND_NAMES: &[(VoteKind, &str)] = &[
    (VoteKind::Nominal, "nominal"),
    (VoteKind::Blank, "branco"),
    (VoteKind::Null, "nulo"),
    (VoteKind::PartyList, "legenda"),
    (VoteKind::NoCandidate, "cargoSemCandidato"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteTuple {
    pub kind: VoteKind,
    pub quantity: u32,
    pub candidate: Option<u32>,
    pub party: Option<u32>,
}

/// Per-kind sums for one office. `total` excludes `no_candidate`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VoteTotals {
    pub nominal: u64,
    pub blank: u64,
    pub null: u64,
    pub party_list: u64,
    pub no_candidate: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfficeResult {
    pub office: Office,
    pub turnout: u32,
    pub votes: Vec<VoteTuple>,
}

impl OfficeResult {
    pub fn totals(&self) -> VoteTotals {
        let mut t = VoteTotals::default();
        for v in &self.votes {
            let q = u64::from(v.quantity);
            match v.kind {
                VoteKind::Nominal => t.nominal += q,
                VoteKind::Blank => t.blank += q,
                VoteKind::Null => t.null += q,
                VoteKind::PartyList => t.party_list += q,
                VoteKind::NoCandidate => t.no_candidate += q,
                VoteKind::Unknown(_) => {}
            }
        }
        t.total = t.nominal + t.blank + t.null + t.party_list;
        t
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElectionResult {
    pub election_id: u32,
    pub eligible_voters: u32,
    pub offices: Vec<OfficeResult>,
}

/// Identity block as written by the machine. The state is absent in the
/// 2022 layout and is recovered from the download path instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BallotIdentity {
    pub state: Option<String>,
    pub municipality: u32,
    pub zone: u32,
    pub section: u32,
    pub polling_place: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Equipment {
    pub session_type: SessionType,
    pub software_version: Option<String>,
    pub load_code: Option<String>,
    pub internal_number: Option<u32>,
}

/// Decoded content of one ballot file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BallotRecord {
    pub generation: SchemaGeneration,
    pub phase: Phase,
    pub identity: BallotIdentity,
    pub equipment: Equipment,
    pub emitted_at: Option<String>,
    pub opened_at: Option<String>,
    pub closed_at: Option<String>,
    pub released_by_code: u32,
    pub biometric_matches: u32,
    pub elections: Vec<ElectionResult>,
}

impl BallotRecord {
    pub fn total_votes(&self) -> u64 {
        self.elections
            .iter()
            .flat_map(|e| &e.offices)
            .flat_map(|o| &o.votes)
            .map(|v| u64::from(v.quantity))
            .sum()
    }

    /// Eligible voters of the first election block.
    pub fn eligible_voters(&self) -> u32 {
        self.elections.first().map_or(0, |e| e.eligible_voters)
    }

    /// Highest turnout reported by any office.
    pub fn turnout(&self) -> u32 {
        self.elections
            .iter()
            .flat_map(|e| &e.offices)
            .map(|o| o.turnout)
            .max()
            .unwrap_or(0)
    }
}
