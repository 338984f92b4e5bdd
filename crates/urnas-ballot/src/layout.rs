//! Context tag numbers of every field the decoder reads, per wire generation.
//!
//! Both generations share the same shape:
//!
//! ```text
//! [APPLICATION 1] envelope
//!     phase, identification, content: OCTET STRING ──► [APPLICATION 2] ballot
//!         phase, equipment { session type, version, correspondence { load { number, code } } }
//!         identification?, emitted at, session { opened, closed }
//!         released by code, biometric matches
//!         elections: SEQUENCE OF { id, eligible, results: SEQUENCE OF {
//!             office kind, turnout, offices: SEQUENCE OF {
//!                 office (CHOICE), print order, votes: SEQUENCE OF {
//!                     kind (CHOICE), quantity, candidate { party, code }? }}}}
//! ```
//!
//! They differ in where the section identity lives and in a few renumbered
//! fields. A tag of `None` means the generation does not carry that field.

use urnas_core::SchemaGeneration;

#[derive(Debug, Clone, Copy)]
pub struct EnvelopeTags {
    pub application: u32,
    pub header: u32,
    pub phase: u32,
    pub identification: u32,
    pub kind: u32,
    pub content: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct BallotTags {
    pub application: u32,
    pub header: u32,
    pub phase: u32,
    pub equipment: u32,
    pub identification: Option<u32>,
    pub emitted_at: u32,
    pub session: u32,
    pub opened_at: u32,
    pub closed_at: u32,
    pub released_by_code: u32,
    pub biometric_matches: u32,
    pub elections: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct IdentificationTags {
    /// CHOICE alternative for a regular polling section.
    pub section_choice: u32,
    pub municipality_zone: u32,
    pub municipality: u32,
    pub zone: u32,
    pub section: u32,
    pub polling_place: u32,
    pub state: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct EquipmentTags {
    pub session_type: u32,
    pub software_version: u32,
    pub correspondence: u32,
    pub load: u32,
    pub internal_number: u32,
    pub load_code: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ElectionTags {
    pub election_id: u32,
    pub eligible_voters: u32,
    pub results: u32,
    pub office_kind: u32,
    pub turnout: u32,
    pub offices: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct OfficeTags {
    pub office: u32,
    pub print_order: u32,
    pub votes: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct VoteTags {
    pub kind: u32,
    pub quantity: u32,
    pub candidate_block: u32,
    pub party: u32,
    pub candidate: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub generation: SchemaGeneration,
    pub envelope: EnvelopeTags,
    pub ballot: BallotTags,
    pub identification: IdentificationTags,
    pub equipment: EquipmentTags,
    pub election: ElectionTags,
    pub office: OfficeTags,
    pub vote: VoteTags,
}

const ENVELOPE: EnvelopeTags = EnvelopeTags {
    application: 1,
    header: 0,
    phase: 1,
    identification: 3,
    kind: 4,
    content: 5,
};

const ELECTION: ElectionTags = ElectionTags {
    election_id: 0,
    eligible_voters: 1,
    results: 2,
    office_kind: 0,
    turnout: 1,
    offices: 2,
};

const OFFICE: OfficeTags = OfficeTags {
    office: 0,
    print_order: 1,
    votes: 2,
};

/// 2022 layout: identity repeated inside the ballot message, no state code.
pub const V1: Layout = Layout {
    generation: SchemaGeneration::V1,
    envelope: ENVELOPE,
    ballot: BallotTags {
        application: 2,
        header: 0,
        phase: 1,
        equipment: 2,
        identification: Some(3),
        emitted_at: 4,
        session: 5,
        opened_at: 0,
        closed_at: 1,
        released_by_code: 6,
        biometric_matches: 7,
        elections: 8,
    },
    identification: IdentificationTags {
        section_choice: 0,
        municipality_zone: 0,
        municipality: 0,
        zone: 1,
        section: 1,
        polling_place: 2,
        state: None,
    },
    equipment: EquipmentTags {
        session_type: 0,
        software_version: 1,
        correspondence: 2,
        load: 1,
        internal_number: 0,
        load_code: 3,
    },
    election: ELECTION,
    office: OFFICE,
    vote: VoteTags {
        kind: 0,
        quantity: 1,
        candidate_block: 2,
        party: 0,
        candidate: 1,
    },
};

/// 2024 layout: identity only in the envelope, with the state code; the
/// candidate block moved to make room for an optional field at tag 2.
pub const V2: Layout = Layout {
    generation: SchemaGeneration::V2,
    envelope: ENVELOPE,
    ballot: BallotTags {
        application: 2,
        header: 0,
        phase: 1,
        equipment: 2,
        identification: None,
        emitted_at: 4,
        session: 5,
        opened_at: 0,
        closed_at: 1,
        released_by_code: 6,
        biometric_matches: 7,
        elections: 8,
    },
    identification: IdentificationTags {
        section_choice: 0,
        municipality_zone: 0,
        municipality: 0,
        zone: 1,
        section: 1,
        polling_place: 2,
        state: Some(3),
    },
    equipment: EquipmentTags {
        session_type: 0,
        software_version: 1,
        correspondence: 2,
        load: 1,
        internal_number: 0,
        load_code: 4,
    },
    election: ELECTION,
    office: OFFICE,
    vote: VoteTags {
        kind: 0,
        quantity: 1,
        candidate_block: 3,
        party: 0,
        candidate: 1,
    },
};

impl Layout {
    pub fn for_generation(generation: SchemaGeneration) -> &'static Layout {
        match generation {
            SchemaGeneration::V1 => &V1,
            SchemaGeneration::V2 => &V2,
        }
    }
}
