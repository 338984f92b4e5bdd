//! URL building and JSON interpretation for the authority's four-level
//! hierarchy: election catalog, state configuration, section manifest, file.

use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};
use urnas_core::model::is_placeholder_hash;
use urnas_core::{ManifestEntry, RoundCode, Section};

use crate::client::Fetcher;
use crate::error::FetchError;

/// Election list published at `{base}/comum/config/ele-c.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElectionCatalog {
    /// Catalog cycle label.
    #[serde(default, rename = "c", deserialize_with = "lenient_string")]
    pub cycle: String,
    #[serde(default, rename = "dg", deserialize_with = "lenient_string")]
    pub generated_on: String,
    #[serde(default, rename = "hg", deserialize_with = "lenient_string")]
    pub generated_at: String,
    #[serde(default, rename = "pl")]
    pub rounds: Vec<PublishedRound>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishedRound {
    #[serde(default, rename = "cd", deserialize_with = "lenient_string")]
    pub code: String,
    #[serde(default, rename = "t", deserialize_with = "lenient_string")]
    pub round: String,
    #[serde(default, rename = "dt", deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(default, rename = "e")]
    pub elections: Vec<PublishedElection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishedElection {
    #[serde(default, rename = "cd", deserialize_with = "lenient_string")]
    pub code: String,
    #[serde(default, rename = "nm", deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, rename = "t", deserialize_with = "lenient_string")]
    pub round: String,
}

/// Municipalities, zones and sections of one state for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateManifest {
    pub state: String,
    pub name: String,
    pub municipalities: Vec<Municipality>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Municipality {
    pub code: String,
    pub name: String,
    pub zones: Vec<Zone>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub code: String,
    pub sections: Vec<String>,
}

/// A section together with its municipality's display name, for filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedSection {
    pub section: Section,
    pub municipality_name: String,
}

impl StateManifest {
    pub fn section_count(&self) -> usize {
        self.municipalities
            .iter()
            .flat_map(|m| &m.zones)
            .map(|z| z.sections.len())
            .sum()
    }

    pub fn sections(&self) -> impl Iterator<Item = ListedSection> + '_ {
        self.municipalities.iter().flat_map(move |m| {
            m.zones.iter().flat_map(move |z| {
                z.sections.iter().map(move |s| ListedSection {
                    section: Section::new(&self.state, &m.code, &z.code, s),
                    municipality_name: m.name.clone(),
                })
            })
        })
    }
}

// ── Raw authority JSON ──

#[derive(Deserialize)]
struct RawStateConfig {
    #[serde(default)]
    abr: Vec<RawState>,
}

#[derive(Deserialize)]
struct RawState {
    #[serde(default, deserialize_with = "lenient_string")]
    cd: String,
    #[serde(default, deserialize_with = "lenient_string")]
    ds: String,
    #[serde(default)]
    mu: Vec<RawMunicipality>,
}

#[derive(Deserialize)]
struct RawMunicipality {
    #[serde(deserialize_with = "lenient_string")]
    cd: String,
    #[serde(default, deserialize_with = "lenient_string")]
    nm: String,
    #[serde(default)]
    zon: Vec<RawZone>,
}

#[derive(Deserialize)]
struct RawZone {
    #[serde(deserialize_with = "lenient_string")]
    cd: String,
    #[serde(default)]
    sec: Vec<RawSection>,
}

#[derive(Deserialize)]
struct RawSection {
    #[serde(deserialize_with = "lenient_string")]
    ns: String,
}

#[derive(Deserialize)]
struct RawSectionManifest {
    #[serde(default)]
    hashes: Vec<RawHashGroup>,
}

#[derive(Deserialize)]
struct RawHashGroup {
    #[serde(default, deserialize_with = "lenient_string")]
    hash: String,
    #[serde(default, deserialize_with = "lenient_string")]
    st: String,
    #[serde(default, deserialize_with = "lenient_string")]
    dr: String,
    #[serde(default, deserialize_with = "lenient_string")]
    hr: String,
    /// 2022 file list.
    nmarq: Option<Vec<String>>,
    /// 2024 file list: objects with `nm`, or plain names.
    arq: Option<Vec<RawFile>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFile {
    Named { nm: String },
    Plain(String),
}

impl RawHashGroup {
    fn into_entry(self) -> ManifestEntry {
        let files = match (self.nmarq, self.arq) {
            (Some(names), _) => names,
            (None, Some(files)) => files
                .into_iter()
                .map(|f| match f {
                    RawFile::Named { nm } => nm,
                    RawFile::Plain(nm) => nm,
                })
                .collect(),
            (None, None) => Vec::new(),
        };
        ManifestEntry {
            hash: self.hash,
            status: self.st,
            date: self.dr,
            time: self.hr,
            files,
        }
    }
}

/// Codes arrive as strings or bare numbers depending on the endpoint.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        S(String),
        N(serde_json::Number),
        Null,
    }
    Ok(match Lenient::deserialize(d)? {
        Lenient::S(s) => s,
        Lenient::N(n) => n.to_string(),
        Lenient::Null => String::new(),
    })
}

/// Builds authority URLs and interprets the JSON behind them.
///
/// Holds nothing but the fetcher and base URL.
#[derive(Clone)]
pub struct ResourceNavigator {
    fetcher: Arc<dyn Fetcher>,
    base_url: String,
}

impl ResourceNavigator {
    /// `base_url` should be like `https://resultados.tse.jus.br/oficial` (no trailing slash).
    pub fn new(fetcher: Arc<dyn Fetcher>, base_url: &str) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    pub fn elections_url(&self) -> String {
        format!("{}/comum/config/ele-c.json", self.base_url)
    }

    pub fn state_manifest_url(&self, cycle: &str, round: &RoundCode, state: &str) -> String {
        let uf = state.to_ascii_lowercase();
        format!(
            "{}/{cycle}/arquivo-urna/{round}/config/{uf}/{uf}-p000{round}-cs.json",
            self.base_url
        )
    }

    pub fn section_manifest_url(&self, cycle: &str, round: &RoundCode, section: &Section) -> String {
        let Section {
            state,
            municipality,
            zone,
            section,
        } = section;
        format!(
            "{}/{cycle}/arquivo-urna/{round}/dados/{state}/{municipality}/{zone}/{section}/p000{round}-{state}-m{municipality}-z{zone}-s{section}-aux.json",
            self.base_url
        )
    }

    pub fn file_url(
        &self,
        cycle: &str,
        round: &RoundCode,
        section: &Section,
        hash: &str,
        file_name: &str,
    ) -> String {
        format!(
            "{}/{cycle}/arquivo-urna/{round}/dados/{}/{}/{}/{}/{hash}/{file_name}",
            self.base_url, section.state, section.municipality, section.zone, section.section
        )
    }

    /// Empty catalog when the authority has nothing published.
    pub async fn list_elections(&self) -> Result<ElectionCatalog, FetchError> {
        let url = self.elections_url();
        match self.fetcher.fetch_json(&url).await? {
            Some(value) => parse(&url, value),
            None => Ok(ElectionCatalog::default()),
        }
    }

    /// `None` when the state has no published configuration for the round.
    pub async fn state_manifest(
        &self,
        cycle: &str,
        round: &RoundCode,
        state: &str,
    ) -> Result<Option<StateManifest>, FetchError> {
        let url = self.state_manifest_url(cycle, round, state);
        let Some(value) = self.fetcher.fetch_json(&url).await? else {
            warn!(state, %round, "state configuration not published");
            return Ok(None);
        };
        let raw: RawStateConfig = parse(&url, value)?;
        let Some(first) = raw.abr.into_iter().next() else {
            warn!(state, %round, "state configuration is empty");
            return Ok(None);
        };

        let code = if first.cd.is_empty() {
            state.to_ascii_lowercase()
        } else {
            first.cd.to_ascii_lowercase()
        };
        let name = if first.ds.is_empty() {
            state.to_ascii_uppercase()
        } else {
            first.ds
        };
        Ok(Some(StateManifest {
            state: code,
            name,
            municipalities: first
                .mu
                .into_iter()
                .map(|m| Municipality {
                    code: m.cd,
                    name: m.nm,
                    zones: m
                        .zon
                        .into_iter()
                        .map(|z| Zone {
                            code: z.cd,
                            sections: z.sec.into_iter().map(|s| s.ns).collect(),
                        })
                        .collect(),
                })
                .collect(),
        }))
    }

    /// Manifest entries that point at files. Unpublished sections and
    /// placeholder hashes yield nothing.
    pub async fn section_manifest(
        &self,
        cycle: &str,
        round: &RoundCode,
        section: &Section,
    ) -> Result<Vec<ManifestEntry>, FetchError> {
        let url = self.section_manifest_url(cycle, round, section);
        let Some(value) = self.fetcher.fetch_json(&url).await? else {
            debug!(%section, "section manifest not published");
            return Ok(Vec::new());
        };
        let raw: RawSectionManifest = parse(&url, value)?;
        Ok(raw
            .hashes
            .into_iter()
            .filter(|h| !is_placeholder_hash(&h.hash))
            .map(RawHashGroup::into_entry)
            .collect())
    }
}

fn parse<T: serde::de::DeserializeOwned>(url: &str, value: serde_json::Value) -> Result<T, FetchError> {
    serde_json::from_value(value).map_err(|source| FetchError::Json {
        url: url.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DownloadOutcome;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::path::Path;

    struct Canned(HashMap<String, serde_json::Value>);

    #[async_trait]
    impl Fetcher for Canned {
        async fn fetch_json(&self, url: &str) -> Result<Option<serde_json::Value>, FetchError> {
            Ok(self.0.get(url).cloned())
        }

        async fn download_file(&self, _: &str, _: &Path) -> Result<DownloadOutcome, FetchError> {
            Ok(DownloadOutcome::NotFound)
        }
    }

    fn navigator(pages: Vec<(String, serde_json::Value)>) -> ResourceNavigator {
        ResourceNavigator::new(Arc::new(Canned(pages.into_iter().collect())), "http://tse/")
    }

    #[test]
    fn urls_follow_authority_layout() {
        let nav = navigator(vec![]);
        let round = RoundCode::from("406");
        let s = Section::new("DF", "97012", "0001", "0042");
        assert_eq!(nav.elections_url(), "http://tse/comum/config/ele-c.json");
        assert_eq!(
            nav.state_manifest_url("ele2022", &round, "DF"),
            "http://tse/ele2022/arquivo-urna/406/config/df/df-p000406-cs.json"
        );
        assert_eq!(
            nav.section_manifest_url("ele2022", &round, &s),
            "http://tse/ele2022/arquivo-urna/406/dados/df/97012/0001/0042/p000406-df-m97012-z0001-s0042-aux.json"
        );
        assert_eq!(
            nav.file_url("ele2022", &round, &s, "abc", "o00406-9701200010042.bu"),
            "http://tse/ele2022/arquivo-urna/406/dados/df/97012/0001/0042/abc/o00406-9701200010042.bu"
        );
    }

    #[tokio::test]
    async fn state_manifest_walks_hierarchy() {
        let nav = navigator(vec![(
            "http://tse/ele2022/arquivo-urna/406/config/ac/ac-p000406-cs.json".into(),
            json!({"abr": [{"cd": "AC", "ds": "ACRE", "mu": [
                {"cd": "01120", "nm": "RIO BRANCO", "zon": [
                    {"cd": "0008", "sec": [{"ns": "0001"}, {"ns": "0002"}]},
                    {"cd": "0009", "sec": [{"ns": "0010"}]}
                ]},
                {"cd": 1007, "nm": "BUJARI", "zon": []}
            ]}]}),
        )]);
        let round = RoundCode::from("406");
        let m = nav.state_manifest("ele2022", &round, "ac").await.unwrap().unwrap();
        assert_eq!(m.state, "ac");
        assert_eq!(m.name, "ACRE");
        assert_eq!(m.section_count(), 3);
        assert_eq!(m.municipalities[1].code, "1007");
        let listed: Vec<_> = m.sections().collect();
        assert_eq!(listed[2].section, Section::new("ac", "01120", "0009", "0010"));
        assert_eq!(listed[2].municipality_name, "RIO BRANCO");

        assert!(nav.state_manifest("ele2022", &round, "sp").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn section_manifest_reads_both_file_list_shapes() {
        let s = Section::new("df", "97012", "0001", "0042");
        let round = RoundCode::from("406");
        let nav = navigator(vec![]);
        let url = nav.section_manifest_url("ele2022", &round, &s);
        let nav = navigator(vec![(
            url,
            json!({"hashes": [
                {"hash": "aa11", "st": "Totalizado", "dr": "02/10/2022", "hr": "17:05:00",
                 "nmarq": ["o00406-9701200010042.bu", "o00406-9701200010042.logjez"]},
                {"hash": "bb22", "st": "Recebido", "arq": [{"nm": "o00406-x-bu.dat"}, "o00406-x-rdv.dat"]},
                {"hash": "0", "nmarq": ["ghost.bu"]},
                {"hash": "", "nmarq": ["ghost2.bu"]}
            ]}),
        )]);
        let entries = nav.section_manifest("ele2022", &round, &s).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].files.len(), 2);
        assert_eq!(entries[0].status, "Totalizado");
        assert_eq!(entries[1].files, vec!["o00406-x-bu.dat", "o00406-x-rdv.dat"]);

        let other = Section::new("df", "97012", "0001", "0043");
        assert!(nav.section_manifest("ele2022", &round, &other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn election_catalog_parses() {
        let nav = navigator(vec![(
            "http://tse/comum/config/ele-c.json".into(),
            json!({"c": "ele2022", "dg": "01/11/2022", "hg": "10:00:00", "pl": [
                {"cd": "406", "t": "1", "dt": "02/10/2022", "e": [{"cd": "544", "nm": "Eleição Geral Federal 2022", "t": "1"}]},
                {"cd": 407, "t": 2, "dt": "30/10/2022", "e": []}
            ]}),
        )]);
        let catalog = nav.list_elections().await.unwrap();
        assert_eq!(catalog.cycle, "ele2022");
        assert_eq!(catalog.rounds.len(), 2);
        assert_eq!(catalog.rounds[1].code, "407");
        assert_eq!(catalog.rounds[0].elections[0].code, "544");
    }

    #[tokio::test]
    async fn malformed_manifest_is_an_error() {
        let s = Section::new("df", "1", "2", "3");
        let round = RoundCode::from("406");
        let url = navigator(vec![]).section_manifest_url("ele2022", &round, &s);
        let nav = navigator(vec![(url, json!({"hashes": "nope"}))]);
        let err = nav.section_manifest("ele2022", &round, &s).await.unwrap_err();
        assert!(matches!(err, FetchError::Json { .. }));
    }
}
