//! Static tables published by the election authority: cycles, round codes,
//! states, regions, timezone offsets, and office names.

use crate::ballot::SchemaGeneration;

/// A known election cycle and the authority codes for its two rounds.
#[derive(Debug, Clone, Copy)]
pub struct ElectionCycle {
    pub cycle: &'static str,
    pub description: &'static str,
    pub first_round: &'static str,
    pub second_round: &'static str,
    pub first_election: &'static str,
    pub second_election: &'static str,
    pub generation: SchemaGeneration,
    pub offices: &'static [u32],
}

pub const CYCLES: &[ElectionCycle] = &[
    ElectionCycle {
        cycle: "ele2022",
        description: "General election 2022",
        first_round: "406",
        second_round: "407",
        first_election: "544",
        second_election: "545",
        generation: SchemaGeneration::V1,
        offices: &[1, 3, 5, 6, 7],
    },
    ElectionCycle {
        cycle: "ele2024",
        description: "Municipal election 2024",
        first_round: "452",
        second_round: "453",
        first_election: "619",
        second_election: "620",
        generation: SchemaGeneration::V2,
        offices: &[11, 13],
    },
];

pub fn cycle(name: &str) -> Option<&'static ElectionCycle> {
    CYCLES.iter().find(|c| c.cycle == name)
}

pub fn cycle_for_round(code: &str) -> Option<&'static ElectionCycle> {
    CYCLES
        .iter()
        .find(|c| c.first_round == code || c.second_round == code)
}

/// Round number for an authority round code. Unknown codes map to 1.
pub fn round_number(code: &str) -> u8 {
    match cycle_for_round(code) {
        Some(c) if c.second_round == code => 2,
        _ => 1,
    }
}

pub const STATES: [&str; 27] = [
    "ac", "al", "ap", "am", "ba", "ce", "df", "es", "go", "ma", "mt", "ms", "mg", "pa", "pb",
    "pr", "pe", "pi", "rj", "rn", "rs", "ro", "rr", "sc", "sp", "se", "to",
];

const REGIONS: &[(&str, &[&str])] = &[
    ("norte", &["ac", "am", "ap", "pa", "ro", "rr", "to"]),
    (
        "nordeste",
        &["al", "ba", "ce", "ma", "pb", "pe", "pi", "rn", "se"],
    ),
    ("centro_oeste", &["df", "go", "ms", "mt"]),
    ("sudeste", &["es", "mg", "rj", "sp"]),
    ("sul", &["pr", "rs", "sc"]),
];

pub fn region_of(state: &str) -> &'static str {
    let state = state.to_ascii_lowercase();
    REGIONS
        .iter()
        .find(|(_, states)| states.contains(&state.as_str()))
        .map_or("desconhecida", |(region, _)| region)
}

/// Hours behind the capital's time zone. Machines log local time.
pub fn timezone_offset(state: &str) -> i32 {
    match state.to_ascii_lowercase().as_str() {
        "ac" => -2,
        "am" | "mt" | "ms" | "ro" | "rr" => -1,
        _ => 0,
    }
}

const OFFICES: &[(u32, &str, &str)] = &[
    (1, "presidente", "Presidente"),
    (2, "vicePresidente", "Vice-Presidente"),
    (3, "governador", "Governador"),
    (4, "viceGovernador", "Vice-Governador"),
    (5, "senador", "Senador"),
    (6, "deputadoFederal", "Deputado Federal"),
    (7, "deputadoEstadual", "Deputado Estadual"),
    (8, "deputadoDistrital", "Deputado Distrital"),
    (9, "primeiroSuplenteSenador", "1º Suplente Senador"),
    (10, "segundoSuplenteSenador", "2º Suplente Senador"),
    (11, "prefeito", "Prefeito"),
    (12, "vicePrefeito", "Vice-Prefeito"),
    (13, "vereador", "Vereador"),
];

pub fn office_code_for_name(name: &str) -> Option<u32> {
    OFFICES
        .iter()
        .find(|(_, wire, _)| *wire == name)
        .map(|(code, _, _)| *code)
}

pub fn office_wire_name(code: u32) -> Option<&'static str> {
    OFFICES
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, wire, _)| *wire)
}

pub fn office_label(code: u32) -> Option<&'static str> {
    OFFICES
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, _, label)| *label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_state_has_a_region() {
        for state in STATES {
            assert_ne!(region_of(state), "desconhecida", "{state}");
        }
        assert_eq!(region_of("XX"), "desconhecida");
        assert_eq!(region_of("SP"), "sudeste");
    }

    #[test]
    fn round_numbers() {
        assert_eq!(round_number("406"), 1);
        assert_eq!(round_number("407"), 2);
        assert_eq!(round_number("452"), 1);
        assert_eq!(round_number(""), 1);
        assert_eq!(
            cycle_for_round("453").map(|c| c.generation),
            Some(SchemaGeneration::V2)
        );
    }

    #[test]
    fn office_name_table_round_trips() {
        for code in 1..=13 {
            let name = office_wire_name(code).unwrap();
            assert_eq!(office_code_for_name(name), Some(code));
        }
    }

    #[test]
    fn timezone_offsets() {
        assert_eq!(timezone_offset("ac"), -2);
        assert_eq!(timezone_offset("AM"), -1);
        assert_eq!(timezone_offset("sp"), 0);
    }
}
