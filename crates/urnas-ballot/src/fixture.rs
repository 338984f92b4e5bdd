//! Synthetic ballot encoder for tests.
//!
//! Writes a [`BallotRecord`] back out using the same tag tables the decoder
//! reads, so tests can build ballots with known totals without shipping
//! real machine files.

use urnas_core::{BallotIdentity, BallotRecord, ElectionResult, OfficeResult, VoteTuple};

use crate::ber::{Class, universal};
use crate::layout::Layout;

#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureOptions {
    /// Emit office, vote kind, and session type as symbolic names where
    /// one exists, instead of numbers.
    pub symbolic_names: bool,
    /// Sprinkle unknown fields (including a high tag number) through
    /// the message to exercise skipping.
    pub unknown_fields: bool,
}

pub fn encode_ballot(record: &BallotRecord, options: FixtureOptions) -> Vec<u8> {
    let layout = Layout::for_generation(record.generation);
    let message = ballot_message(record, layout, options);

    let env = &layout.envelope;
    let mut fields = vec![
        ctx(env.header, &[ctx_text(0, "20221002 170000")]),
        ctx_int(env.phase, record.phase.code()),
        ctx(env.identification, &[identity(&record.identity, layout)]),
        ctx_int(env.kind, 1),
        tlv(Class::Context, false, env.content, &message),
    ];
    if options.unknown_fields {
        fields.insert(2, ctx_text(9, "ignored"));
    }
    tlv(Class::Application, true, env.application, &fields.concat())
}

fn ballot_message(record: &BallotRecord, layout: &Layout, options: FixtureOptions) -> Vec<u8> {
    let tags = &layout.ballot;
    let mut fields = vec![
        ctx(tags.header, &[ctx_int(0, 1)]),
        ctx_int(tags.phase, record.phase.code()),
        equipment(record, layout, options),
    ];
    if let Some(tag) = tags.identification {
        fields.push(ctx(tag, &[identity(&record.identity, layout)]));
    }
    if let Some(at) = &record.emitted_at {
        fields.push(ctx_text(tags.emitted_at, at));
    }
    let mut session = Vec::new();
    if let Some(at) = &record.opened_at {
        session.push(ctx_text(tags.opened_at, at));
    }
    if let Some(at) = &record.closed_at {
        session.push(ctx_text(tags.closed_at, at));
    }
    if !session.is_empty() {
        fields.push(ctx(tags.session, &session));
    }
    if options.unknown_fields {
        fields.push(ctx_int(30, 7));
        fields.push(ctx(200, &[ctx_int(0, 1)]));
    }
    fields.push(ctx_int(tags.released_by_code, i64::from(record.released_by_code)));
    fields.push(ctx_int(tags.biometric_matches, i64::from(record.biometric_matches)));
    let elections: Vec<Vec<u8>> = record
        .elections
        .iter()
        .map(|e| election(e, layout, options))
        .collect();
    fields.push(ctx(tags.elections, &elections));
    tlv(Class::Application, true, tags.application, &fields.concat())
}

fn identity(id: &BallotIdentity, layout: &Layout) -> Vec<u8> {
    let tags = &layout.identification;
    let mut fields = vec![
        ctx(
            tags.municipality_zone,
            &[
                ctx_int(tags.municipality, i64::from(id.municipality)),
                ctx_int(tags.zone, i64::from(id.zone)),
            ],
        ),
        ctx_int(tags.section, i64::from(id.section)),
    ];
    if let Some(place) = id.polling_place {
        fields.push(ctx_int(tags.polling_place, i64::from(place)));
    }
    if let (Some(tag), Some(state)) = (tags.state, &id.state) {
        fields.push(ctx_text(tag, &state.to_ascii_uppercase()));
    }
    ctx(tags.section_choice, &fields)
}

fn equipment(record: &BallotRecord, layout: &Layout, options: FixtureOptions) -> Vec<u8> {
    let tags = &layout.equipment;
    let eq = &record.equipment;
    let session = match eq.session_type.wire_name() {
        Some(name) if options.symbolic_names => visible(name),
        _ => universal_int(eq.session_type.code()),
    };
    let mut fields = vec![ctx(tags.session_type, &[session])];
    if let Some(v) = &eq.software_version {
        fields.push(ctx_text(tags.software_version, v));
    }
    let mut load = Vec::new();
    if let Some(n) = eq.internal_number {
        load.push(ctx_int(tags.internal_number, i64::from(n)));
    }
    if let Some(code) = &eq.load_code {
        load.push(ctx_text(tags.load_code, code));
    }
    if !load.is_empty() {
        fields.push(ctx(tags.correspondence, &[ctx(tags.load, &load)]));
    }
    ctx(layout.ballot.equipment, &fields)
}

fn election(e: &ElectionResult, layout: &Layout, options: FixtureOptions) -> Vec<u8> {
    let tags = &layout.election;
    // Offices sharing a turnout go in one results block.
    let mut blocks: Vec<(u32, Vec<&OfficeResult>)> = Vec::new();
    for office in &e.offices {
        match blocks.iter_mut().find(|(t, _)| *t == office.turnout) {
            Some((_, list)) => list.push(office),
            None => blocks.push((office.turnout, vec![office])),
        }
    }
    let blocks: Vec<Vec<u8>> = blocks
        .into_iter()
        .map(|(turnout, offices)| {
            let offices: Vec<Vec<u8>> = offices
                .into_iter()
                .enumerate()
                .map(|(i, o)| office(o, i, layout, options))
                .collect();
            sequence(&[
                ctx_int(tags.office_kind, 1),
                ctx_int(tags.turnout, i64::from(turnout)),
                ctx(tags.offices, &offices),
            ])
        })
        .collect();
    sequence(&[
        ctx_int(tags.election_id, i64::from(e.election_id)),
        ctx_int(tags.eligible_voters, i64::from(e.eligible_voters)),
        ctx(tags.results, &blocks),
    ])
}

fn office(o: &OfficeResult, order: usize, layout: &Layout, options: FixtureOptions) -> Vec<u8> {
    let tags = &layout.office;
    let code = match o.office.wire_name() {
        Some(name) if options.symbolic_names => visible(name),
        _ => universal_int(i64::from(o.office.code())),
    };
    let votes: Vec<Vec<u8>> = o.votes.iter().map(|v| vote(v, layout, options)).collect();
    sequence(&[
        ctx(tags.office, &[code]),
        ctx_int(tags.print_order, order as i64 + 1),
        ctx(tags.votes, &votes),
    ])
}

fn vote(v: &VoteTuple, layout: &Layout, options: FixtureOptions) -> Vec<u8> {
    let tags = &layout.vote;
    let kind = match v.kind.wire_name() {
        Some(name) if options.symbolic_names => visible(name),
        _ => tlv(Class::Universal, false, universal::ENUMERATED, &integer(v.kind.code())),
    };
    let mut fields = vec![
        ctx(tags.kind, &[kind]),
        ctx_int(tags.quantity, i64::from(v.quantity)),
    ];
    if options.unknown_fields {
        fields.push(ctx_int(7, 99));
    }
    let mut candidate = Vec::new();
    if let Some(p) = v.party {
        candidate.push(ctx_int(tags.party, i64::from(p)));
    }
    if let Some(c) = v.candidate {
        candidate.push(ctx_int(tags.candidate, i64::from(c)));
    }
    if !candidate.is_empty() {
        fields.push(ctx(tags.candidate_block, &candidate));
    }
    sequence(&fields)
}

// ── Primitive encoders ──

pub fn tlv(class: Class, constructed: bool, tag: u32, content: &[u8]) -> Vec<u8> {
    let mut out = identifier(class, constructed, tag);
    out.extend(length(content.len()));
    out.extend_from_slice(content);
    out
}

fn identifier(class: Class, constructed: bool, tag: u32) -> Vec<u8> {
    let lead = (class.bits() << 6) | if constructed { 0x20 } else { 0 };
    if tag < 0x1f {
        return vec![lead | tag as u8];
    }
    let mut groups = vec![(tag & 0x7f) as u8];
    let mut rest = tag >> 7;
    while rest > 0 {
        groups.push(0x80 | (rest & 0x7f) as u8);
        rest >>= 7;
    }
    groups.push(lead | 0x1f);
    groups.reverse();
    groups
}

fn length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let mut out = vec![0x80 | (bytes.len() - skip) as u8];
    out.extend_from_slice(&bytes[skip..]);
    out
}

/// Minimal two's complement content octets.
pub fn integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

pub fn ctx(tag: u32, children: &[Vec<u8>]) -> Vec<u8> {
    tlv(Class::Context, true, tag, &children.concat())
}

pub fn ctx_int(tag: u32, value: i64) -> Vec<u8> {
    tlv(Class::Context, false, tag, &integer(value))
}

pub fn ctx_text(tag: u32, text: &str) -> Vec<u8> {
    tlv(Class::Context, false, tag, text.as_bytes())
}

pub fn sequence(children: &[Vec<u8>]) -> Vec<u8> {
    tlv(Class::Universal, true, universal::SEQUENCE, &children.concat())
}

pub fn universal_int(value: i64) -> Vec<u8> {
    tlv(Class::Universal, false, universal::INTEGER, &integer(value))
}

pub fn visible(text: &str) -> Vec<u8> {
    tlv(Class::Universal, false, universal::VISIBLE_STRING, text.as_bytes())
}
