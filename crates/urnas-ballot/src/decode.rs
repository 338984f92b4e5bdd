//! Ballot decoding: unwrap the envelope, then decode the inner message.

use std::path::Path;

use tracing::{debug, trace};
use urnas_core::naming;
use urnas_core::{
    BallotIdentity, BallotRecord, ElectionResult, Equipment, Office, OfficeResult, Phase,
    SchemaGeneration, SessionType, VoteKind, VoteTuple,
};

use crate::ber::{self, Class, Tlv};
use crate::error::DecodeError;
use crate::layout::{ElectionTags, EquipmentTags, IdentificationTags, Layout, OfficeTags, VoteTags};

/// Decode one ballot file's bytes with an explicit wire generation.
pub fn decode(bytes: &[u8], generation: SchemaGeneration) -> Result<BallotRecord, DecodeError> {
    let layout = Layout::for_generation(generation);
    let envelope = read_envelope(bytes, layout)?;
    let (content, content_offset) = envelope.content.ok_or(DecodeError::Missing("envelope content"))?;

    let message = ber::read_one(content, content_offset)?;
    expect_application(&message, layout.ballot.application, "ballot message")?;

    let tags = &layout.ballot;
    let mut record = BallotRecord {
        generation,
        phase: envelope.phase.unwrap_or_default(),
        identity: envelope.identity.unwrap_or_default(),
        equipment: Equipment::default(),
        emitted_at: None,
        opened_at: None,
        closed_at: None,
        released_by_code: 0,
        biometric_matches: 0,
        elections: Vec::new(),
    };

    for field in message.children()? {
        let field = field?;
        if field.class != Class::Context {
            trace!(tag = field.tag, "skipping non-context ballot field");
            continue;
        }
        let tag = field.tag;
        if tag == tags.phase {
            record.phase = Phase::from_code(field.integer()?);
        } else if tag == tags.equipment {
            record.equipment = equipment(&field, &layout.equipment)?;
        } else if Some(tag) == tags.identification {
            merge_identity(&mut record.identity, identity(&field, &layout.identification)?);
        } else if tag == tags.emitted_at {
            record.emitted_at = Some(field.text()?);
        } else if tag == tags.session {
            for f in field.children()? {
                let f = f?;
                if f.is_context(tags.opened_at) {
                    record.opened_at = Some(f.text()?);
                } else if f.is_context(tags.closed_at) {
                    record.closed_at = Some(f.text()?);
                }
            }
        } else if tag == tags.released_by_code {
            record.released_by_code = field.unsigned()?;
        } else if tag == tags.biometric_matches {
            record.biometric_matches = field.unsigned()?;
        } else if tag == tags.elections {
            for entry in field.children()? {
                let entry = expect_sequence(entry?)?;
                record.elections.push(election(&entry, &layout.election, layout)?);
            }
        } else {
            trace!(tag, "skipping unknown ballot field");
        }
    }
    Ok(record)
}

/// Decode with the generation inferred from the file name.
pub fn decode_named(file_name: &str, bytes: &[u8]) -> Result<BallotRecord, DecodeError> {
    decode(bytes, naming::detect_generation(file_name))
}

/// Read and decode a ballot file from disk.
pub fn decode_file(path: &Path) -> Result<BallotRecord, DecodeError> {
    let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let record = decode(&bytes, naming::detect_generation_for_path(path))?;
    debug!(path = %path.display(), elections = record.elections.len(), "decoded ballot");
    Ok(record)
}

#[derive(Default)]
struct Envelope<'a> {
    phase: Option<Phase>,
    identity: Option<BallotIdentity>,
    content: Option<(&'a [u8], usize)>,
}

fn read_envelope<'a>(bytes: &'a [u8], layout: &Layout) -> Result<Envelope<'a>, DecodeError> {
    let outer = ber::read_one(bytes, 0)?;
    expect_application(&outer, layout.envelope.application, "ballot envelope")?;

    let tags = &layout.envelope;
    let mut envelope = Envelope::default();
    for field in outer.children()? {
        let field = field?;
        if field.class != Class::Context {
            continue;
        }
        if field.tag == tags.phase {
            envelope.phase = Some(Phase::from_code(field.integer()?));
        } else if field.tag == tags.identification {
            envelope.identity = Some(identity(&field, &layout.identification)?);
        } else if field.tag == tags.content {
            if field.constructed {
                return Err(DecodeError::Unexpected {
                    expected: "primitive envelope content",
                    offset: field.offset,
                });
            }
            envelope.content = Some((field.value, field.value_offset));
        } else {
            trace!(tag = field.tag, "skipping envelope field");
        }
    }
    Ok(envelope)
}

fn expect_application(tlv: &Tlv<'_>, tag: u32, what: &'static str) -> Result<(), DecodeError> {
    if tlv.constructed && tlv.is(Class::Application, tag) {
        Ok(())
    } else {
        Err(DecodeError::Unexpected {
            expected: what,
            offset: tlv.offset,
        })
    }
}

fn expect_sequence(tlv: Tlv<'_>) -> Result<Tlv<'_>, DecodeError> {
    if tlv.is_sequence() {
        Ok(tlv)
    } else {
        Err(DecodeError::Unexpected {
            expected: "SEQUENCE",
            offset: tlv.offset,
        })
    }
}

fn identity(field: &Tlv<'_>, tags: &IdentificationTags) -> Result<BallotIdentity, DecodeError> {
    let mut id = BallotIdentity::default();
    for alternative in field.children()? {
        let alternative = alternative?;
        if !alternative.is_context(tags.section_choice) {
            trace!(tag = alternative.tag, "skipping identification alternative");
            continue;
        }
        for f in alternative.children()? {
            let f = f?;
            if f.class != Class::Context {
                continue;
            }
            if f.tag == tags.municipality_zone && f.constructed {
                for g in f.children()? {
                    let g = g?;
                    if g.is_context(tags.municipality) {
                        id.municipality = g.unsigned()?;
                    } else if g.is_context(tags.zone) {
                        id.zone = g.unsigned()?;
                    }
                }
            } else if f.tag == tags.section {
                id.section = f.unsigned()?;
            } else if f.tag == tags.polling_place {
                id.polling_place = Some(f.unsigned()?);
            } else if Some(f.tag) == tags.state {
                id.state = Some(f.text()?.to_ascii_lowercase());
            }
        }
    }
    Ok(id)
}

/// Ballot-level identification wins field by field over the envelope's.
fn merge_identity(target: &mut BallotIdentity, inner: BallotIdentity) {
    if inner.municipality != 0 {
        target.municipality = inner.municipality;
    }
    if inner.zone != 0 {
        target.zone = inner.zone;
    }
    if inner.section != 0 {
        target.section = inner.section;
    }
    if inner.polling_place.is_some() {
        target.polling_place = inner.polling_place;
    }
    if inner.state.is_some() {
        target.state = inner.state;
    }
}

fn equipment(field: &Tlv<'_>, tags: &EquipmentTags) -> Result<Equipment, DecodeError> {
    let mut eq = Equipment::default();
    for f in field.children()? {
        let f = f?;
        if f.class != Class::Context {
            continue;
        }
        if f.tag == tags.session_type {
            eq.session_type = match choice(&f)? {
                Choice::Code(code) => SessionType::from_code(code),
                Choice::Name(name) => SessionType::from_wire_name(&name).unwrap_or_else(|| {
                    debug!(name, "unknown session type name");
                    SessionType::Unknown(0)
                }),
            };
        } else if f.tag == tags.software_version {
            eq.software_version = Some(f.text()?);
        } else if f.tag == tags.correspondence && f.constructed {
            for load in f.children()? {
                let load = load?;
                if !load.is_context(tags.load) || !load.constructed {
                    continue;
                }
                for g in load.children()? {
                    let g = g?;
                    if g.is_context(tags.internal_number) {
                        eq.internal_number = Some(g.unsigned()?);
                    } else if g.is_context(tags.load_code) {
                        eq.load_code = Some(g.text()?);
                    }
                }
            }
        }
    }
    Ok(eq)
}

fn election(
    entry: &Tlv<'_>,
    tags: &ElectionTags,
    layout: &Layout,
) -> Result<ElectionResult, DecodeError> {
    let mut result = ElectionResult {
        election_id: 0,
        eligible_voters: 0,
        offices: Vec::new(),
    };
    for f in entry.children()? {
        let f = f?;
        if f.is_context(tags.election_id) {
            result.election_id = f.unsigned()?;
        } else if f.is_context(tags.eligible_voters) {
            result.eligible_voters = f.unsigned()?;
        } else if f.is_context(tags.results) {
            for block in f.children()? {
                let block = expect_sequence(block?)?;
                result_block(&block, tags, layout, &mut result.offices)?;
            }
        }
    }
    Ok(result)
}

/// One results block: a turnout shared by every office it lists.
fn result_block(
    block: &Tlv<'_>,
    tags: &ElectionTags,
    layout: &Layout,
    out: &mut Vec<OfficeResult>,
) -> Result<(), DecodeError> {
    let mut turnout = 0;
    let mut offices = Vec::new();
    for f in block.children()? {
        let f = f?;
        if f.is_context(tags.turnout) {
            turnout = f.unsigned()?;
        } else if f.is_context(tags.offices) {
            for entry in f.children()? {
                let entry = expect_sequence(entry?)?;
                offices.push(office(&entry, &layout.office, &layout.vote)?);
            }
        }
    }
    out.extend(offices.into_iter().map(|(office, votes)| OfficeResult {
        office,
        turnout,
        votes,
    }));
    Ok(())
}

fn office(
    entry: &Tlv<'_>,
    tags: &OfficeTags,
    vote_tags: &VoteTags,
) -> Result<(Office, Vec<VoteTuple>), DecodeError> {
    let mut office = Office::Unknown(0);
    let mut votes = Vec::new();
    for f in entry.children()? {
        let f = f?;
        if f.is_context(tags.office) {
            office = match choice(&f)? {
                Choice::Code(code) => {
                    Office::from_code(u32::try_from(code).map_err(|_| DecodeError::OutOfRange {
                        offset: f.offset,
                        value: code,
                    })?)
                }
                Choice::Name(name) => Office::from_wire_name(&name).unwrap_or_else(|| {
                    debug!(name, "unknown office name");
                    Office::Unknown(0)
                }),
            };
        } else if f.is_context(tags.votes) {
            for v in f.children()? {
                let v = expect_sequence(v?)?;
                votes.push(vote(&v, vote_tags)?);
            }
        }
    }
    Ok((office, votes))
}

/// A tuple without a kind, or with a name the catalog lacks, counts as nominal.
fn vote(entry: &Tlv<'_>, tags: &VoteTags) -> Result<VoteTuple, DecodeError> {
    let mut tuple = VoteTuple {
        kind: VoteKind::Nominal,
        quantity: 0,
        candidate: None,
        party: None,
    };
    for f in entry.children()? {
        let f = f?;
        if f.is_context(tags.kind) {
            tuple.kind = match choice(&f)? {
                Choice::Code(code) => VoteKind::from_code(code),
                Choice::Name(name) => VoteKind::from_wire_name(&name).unwrap_or_else(|| {
                    debug!(name, "unknown vote kind name");
                    VoteKind::Nominal
                }),
            };
        } else if f.is_context(tags.quantity) {
            tuple.quantity = f.unsigned()?;
        } else if f.is_context(tags.candidate_block) && f.constructed {
            for g in f.children()? {
                let g = g?;
                if g.is_context(tags.party) {
                    tuple.party = Some(g.unsigned()?);
                } else if g.is_context(tags.candidate) {
                    tuple.candidate = Some(g.unsigned()?);
                }
            }
        }
    }
    Ok(tuple)
}

enum Choice {
    Code(i64),
    Name(String),
}

/// Explicitly tagged CHOICE: the context tag wraps one universal value,
/// either a number or a symbolic name. A primitive context tag holds the
/// number directly.
fn choice(field: &Tlv<'_>) -> Result<Choice, DecodeError> {
    if !field.constructed {
        return field.integer().map(Choice::Code);
    }
    let inner = field
        .children()?
        .next()
        .transpose()?
        .ok_or(DecodeError::Unexpected {
            expected: "CHOICE value",
            offset: field.offset,
        })?;
    if inner.is_number() {
        inner.integer().map(Choice::Code)
    } else if inner.is_text() {
        inner.text().map(Choice::Name)
    } else if !inner.constructed && inner.class != Class::Universal {
        inner.integer().map(Choice::Code)
    } else {
        Err(DecodeError::Unexpected {
            expected: "number or name",
            offset: inner.offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{ctx, ctx_int, sequence, visible};
    use crate::layout::V1;

    fn decode_vote(fields: &[Vec<u8>]) -> VoteTuple {
        let bytes = sequence(fields);
        let entry = ber::read_one(&bytes, 0).unwrap();
        vote(&entry, &V1.vote).unwrap()
    }

    #[test]
    fn vote_without_kind_is_nominal() {
        let tags = &V1.vote;
        let tuple = decode_vote(&[
            ctx_int(tags.quantity, 12),
            ctx(tags.candidate_block, &[ctx_int(tags.party, 13), ctx_int(tags.candidate, 13)]),
        ]);
        assert_eq!(tuple.kind, VoteKind::Nominal);
        assert_eq!(tuple.quantity, 12);
        assert_eq!(tuple.candidate, Some(13));
    }

    #[test]
    fn unlisted_kind_name_is_nominal() {
        let tags = &V1.vote;
        let tuple = decode_vote(&[ctx(tags.kind, &[visible("voto-novo")]), ctx_int(tags.quantity, 3)]);
        assert_eq!(tuple.kind, VoteKind::Nominal);
        assert_eq!(tuple.quantity, 3);
    }

    #[test]
    fn listed_kind_name_wins() {
        let tags = &V1.vote;
        let name = VoteKind::Blank.wire_name().unwrap();
        let tuple = decode_vote(&[ctx(tags.kind, &[visible(name)]), ctx_int(tags.quantity, 4)]);
        assert_eq!(tuple.kind, VoteKind::Blank);
    }
}
