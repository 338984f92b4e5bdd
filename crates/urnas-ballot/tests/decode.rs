use urnas_ballot::fixture::{FixtureOptions, ctx, ctx_int, encode_ballot, tlv, universal_int};
use urnas_ballot::ber::Class;
use urnas_ballot::{DecodeError, decode, decode_file, decode_named};
use urnas_core::{
    BallotIdentity, BallotRecord, ElectionResult, Equipment, Office, OfficeResult, Phase,
    SchemaGeneration, SessionType, VoteKind, VoteTuple,
};

fn nominal(quantity: u32, candidate: u32, party: u32) -> VoteTuple {
    VoteTuple {
        kind: VoteKind::Nominal,
        quantity,
        candidate: Some(candidate),
        party: Some(party),
    }
}

fn bare(kind: VoteKind, quantity: u32) -> VoteTuple {
    VoteTuple {
        kind,
        quantity,
        candidate: None,
        party: None,
    }
}

fn general_election_ballot() -> BallotRecord {
    BallotRecord {
        generation: SchemaGeneration::V1,
        phase: Phase::Official,
        identity: BallotIdentity {
            state: None,
            municipality: 97012,
            zone: 1,
            section: 42,
            polling_place: Some(1015),
        },
        equipment: Equipment {
            session_type: SessionType::Ordinary,
            software_version: Some("8.26.0.0 - Onça-pintada".to_string()),
            load_code: Some("283.492.140.263".to_string()),
            internal_number: Some(2_065_434),
        },
        emitted_at: Some("20221002T170245".to_string()),
        opened_at: Some("20221002T080001".to_string()),
        closed_at: Some("20221002T170012".to_string()),
        released_by_code: 3,
        biometric_matches: 288,
        elections: vec![
            ElectionResult {
                election_id: 544,
                eligible_voters: 380,
                offices: vec![OfficeResult {
                    office: Office::President,
                    turnout: 291,
                    votes: vec![
                        nominal(140, 13, 13),
                        nominal(120, 22, 22),
                        bare(VoteKind::Blank, 9),
                        bare(VoteKind::Null, 22),
                    ],
                }],
            },
            ElectionResult {
                election_id: 546,
                eligible_voters: 380,
                offices: vec![
                    OfficeResult {
                        office: Office::DistrictDeputy,
                        turnout: 291,
                        votes: vec![
                            nominal(31, 1234, 12),
                            VoteTuple {
                                kind: VoteKind::PartyList,
                                quantity: 17,
                                candidate: None,
                                party: Some(12),
                            },
                            bare(VoteKind::Blank, 40),
                        ],
                    },
                    OfficeResult {
                        office: Office::Senator,
                        turnout: 291,
                        votes: vec![nominal(200, 123, 12), bare(VoteKind::Null, 91)],
                    },
                ],
            },
        ],
    }
}

fn municipal_ballot() -> BallotRecord {
    BallotRecord {
        generation: SchemaGeneration::V2,
        phase: Phase::Official,
        identity: BallotIdentity {
            state: Some("ac".to_string()),
            municipality: 1120,
            zone: 8,
            section: 7,
            polling_place: None,
        },
        equipment: Equipment {
            session_type: SessionType::Contingency,
            software_version: Some("9.1.0.0".to_string()),
            load_code: None,
            internal_number: Some(1_500_001),
        },
        emitted_at: Some("20241006T170511".to_string()),
        opened_at: None,
        closed_at: None,
        released_by_code: 0,
        biometric_matches: 150,
        elections: vec![ElectionResult {
            election_id: 619,
            eligible_voters: 210,
            offices: vec![
                OfficeResult {
                    office: Office::Mayor,
                    turnout: 160,
                    votes: vec![nominal(90, 10, 10), nominal(60, 45, 45), bare(VoteKind::Blank, 10)],
                },
                OfficeResult {
                    office: Office::Councillor,
                    turnout: 160,
                    votes: vec![
                        nominal(70, 10123, 10),
                        VoteTuple {
                            kind: VoteKind::PartyList,
                            quantity: 30,
                            candidate: None,
                            party: Some(45),
                        },
                        bare(VoteKind::Null, 20),
                        bare(VoteKind::NoCandidate, 5),
                        bare(VoteKind::Blank, 40),
                    ],
                },
            ],
        }],
    }
}

#[test]
fn v1_decodes_what_was_encoded() {
    let record = general_election_ballot();
    let bytes = encode_ballot(&record, FixtureOptions::default());
    let decoded = decode(&bytes, SchemaGeneration::V1).unwrap();
    assert_eq!(decoded, record);
}

#[test]
fn v2_decodes_what_was_encoded() {
    let record = municipal_ballot();
    let bytes = encode_ballot(&record, FixtureOptions::default());
    let decoded = decode(&bytes, SchemaGeneration::V2).unwrap();
    assert_eq!(decoded, record);
}

#[test]
fn per_office_totals_match_fed_sums() {
    for record in [general_election_ballot(), municipal_ballot()] {
        let bytes = encode_ballot(&record, FixtureOptions::default());
        let decoded = decode(&bytes, record.generation).unwrap();
        for (want, got) in record.elections.iter().zip(&decoded.elections) {
            for (w, g) in want.offices.iter().zip(&got.offices) {
                let fed: u64 = w
                    .votes
                    .iter()
                    .filter(|v| v.kind != VoteKind::NoCandidate)
                    .map(|v| u64::from(v.quantity))
                    .sum();
                assert_eq!(g.totals().total, fed, "{:?}", w.office);
            }
        }
    }

    let decoded = decode(
        &encode_ballot(&municipal_ballot(), FixtureOptions::default()),
        SchemaGeneration::V2,
    )
    .unwrap();
    let councillor = decoded.elections[0].offices[1].totals();
    assert_eq!(councillor.nominal, 70);
    assert_eq!(councillor.party_list, 30);
    assert_eq!(councillor.no_candidate, 5);
    assert_eq!(councillor.total, 160);
}

#[test]
fn symbolic_names_decode_like_numbers() {
    for record in [general_election_ballot(), municipal_ballot()] {
        let options = FixtureOptions {
            symbolic_names: true,
            ..Default::default()
        };
        let decoded = decode(&encode_ballot(&record, options), record.generation).unwrap();
        assert_eq!(decoded, record);
    }
}

#[test]
fn unknown_fields_are_skipped() {
    let record = municipal_ballot();
    let options = FixtureOptions {
        symbolic_names: false,
        unknown_fields: true,
    };
    let decoded = decode(&encode_ballot(&record, options), SchemaGeneration::V2).unwrap();
    assert_eq!(decoded, record);
}

#[test]
fn unknown_codes_are_kept() {
    let mut record = municipal_ballot();
    record.equipment.session_type = SessionType::Unknown(9);
    record.elections[0].offices[0].office = Office::Unknown(77);
    record.elections[0].offices[0].votes.push(bare(VoteKind::Unknown(8), 2));
    let options = FixtureOptions {
        symbolic_names: true,
        ..Default::default()
    };
    let decoded = decode(&encode_ballot(&record, options), SchemaGeneration::V2).unwrap();
    assert_eq!(decoded.equipment.session_type, SessionType::Unknown(9));
    assert_eq!(decoded.elections[0].offices[0].office, Office::Unknown(77));
    assert_eq!(decoded.elections[0].offices[0].votes[3].kind, VoteKind::Unknown(8));
}

#[test]
fn generation_follows_file_name() {
    let v1 = encode_ballot(&general_election_ballot(), FixtureOptions::default());
    let decoded = decode_named("o00406-9701200010042.bu", &v1).unwrap();
    assert_eq!(decoded.generation, SchemaGeneration::V1);
    assert_eq!(decoded.identity.section, 42);

    // Read with the 2024 tables, the 2022 candidate block sits at an
    // unassigned tag and is dropped.
    let misread = decode_named("o00452-9701200010042-bu.dat", &v1).unwrap();
    assert_eq!(misread.generation, SchemaGeneration::V2);
    assert_eq!(misread.elections[0].offices[0].votes[0].candidate, None);
}

#[test]
fn decode_is_deterministic() {
    let bytes = encode_ballot(&general_election_ballot(), FixtureOptions::default());
    let a = decode(&bytes, SchemaGeneration::V1).unwrap();
    let b = decode(&bytes, SchemaGeneration::V1).unwrap();
    assert_eq!(a, b);
}

#[test]
fn minimal_envelope_defaults_absent_fields() {
    let message = tlv(Class::Application, true, 2, &[]);
    let envelope = tlv(
        Class::Application,
        true,
        1,
        &[tlv(Class::Context, false, 5, &message)].concat(),
    );
    let decoded = decode(&envelope, SchemaGeneration::V2).unwrap();
    assert_eq!(decoded.phase, Phase::Official);
    assert_eq!(decoded.identity, BallotIdentity::default());
    assert_eq!(decoded.equipment.session_type, SessionType::Ordinary);
    assert!(decoded.elections.is_empty());
    assert_eq!(decoded.total_votes(), 0);
}

#[test]
fn malformed_input_is_an_error() {
    assert!(matches!(
        decode(&[], SchemaGeneration::V1),
        Err(DecodeError::Truncated { .. })
    ));

    // Wrong outer tag.
    let seq = tlv(Class::Universal, true, 16, &[]);
    assert!(matches!(
        decode(&seq, SchemaGeneration::V1),
        Err(DecodeError::Unexpected { .. })
    ));

    // Envelope without content.
    let empty = tlv(Class::Application, true, 1, &ctx_int(1, 2));
    assert!(matches!(
        decode(&empty, SchemaGeneration::V1),
        Err(DecodeError::Missing(_))
    ));

    // Truncated record.
    let bytes = encode_ballot(&general_election_ballot(), FixtureOptions::default());
    assert!(decode(&bytes[..bytes.len() / 2], SchemaGeneration::V1).is_err());

    // Election list entry that is not a SEQUENCE.
    let message = tlv(Class::Application, true, 2, &ctx(8, &[universal_int(1)]));
    let envelope = tlv(Class::Application, true, 1, &tlv(Class::Context, false, 5, &message));
    assert!(matches!(
        decode(&envelope, SchemaGeneration::V1),
        Err(DecodeError::Unexpected { expected: "SEQUENCE", .. })
    ));
}

#[test]
fn decode_file_reads_from_disk() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("o00452-0112000080007-bu.dat");
    std::fs::write(&path, encode_ballot(&municipal_ballot(), FixtureOptions::default())).unwrap();
    let record = decode_file(&path).unwrap();
    assert_eq!(record.identity.state.as_deref(), Some("ac"));
    assert_eq!(record.eligible_voters(), 210);
    assert_eq!(record.turnout(), 160);

    let missing = decode_file(&tmp.path().join("nope.bu"));
    assert!(matches!(missing, Err(DecodeError::Io { .. })));
}

#[test]
fn record_serializes_to_json() {
    let json = serde_json::to_value(general_election_ballot()).unwrap();
    assert_eq!(json["generation"], "v1");
    assert_eq!(json["elections"][0]["offices"][0]["office"], "president");
}
