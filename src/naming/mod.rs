//! Filename assignment: a pure two-pass computation over the whole index.
//!
//! Pass 1 derives every task's native filename from its URL alone. Pass 2
//! applies the per-record title prefix to multi-download records and then
//! resolves any name still claimed by more than one task with a letter
//! suffix, in a stable order. The result is an injective map from download
//! task to on-disk name plus a conflict report describing every collision.
//!
//! No network or filesystem access happens here; the same index always
//! yields the same assignment, which is what makes interrupted runs safely
//! resumable against the output directory.

pub mod filename;

use std::collections::{BTreeMap, HashSet};

use tracing::warn;

use crate::index::Index;
use filename::{native_filename, sanitize_filename, split_stem_extension, title_prefix};

/// Letter suffixes available for one colliding name.
const LETTER_SUFFIXES: usize = 26;

/// How an assigned filename was disambiguated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disambiguator {
    /// Native filename used unchanged.
    None,
    /// Letter suffix appended (cross-record collision of plain names).
    Lettered,
    /// Title prefix prepended (record with multiple downloads).
    TitlePrefixed,
    /// Title prefix prepended and letter suffix appended.
    TitlePrefixedLettered,
}

impl Disambiguator {
    /// Short machine-readable label for report artifacts.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lettered => "lettered",
            Self::TitlePrefixed => "title-prefixed",
            Self::TitlePrefixedLettered => "title-prefixed-lettered",
        }
    }
}

/// One download task with its final on-disk name.
#[derive(Debug, Clone)]
pub struct Assignment {
    /// Owning record's stable identifier.
    pub record_id: String,
    /// Index CSV column the URL came from.
    pub column: String,
    /// The download URL.
    pub url: String,
    /// Final on-disk filename, unique within the output directory.
    pub filename: String,
    /// How the name was disambiguated.
    pub tag: Disambiguator,
}

/// A task that could not receive a name: the letter scheme ran past `z`.
#[derive(Debug, Clone)]
pub struct NamingAnomaly {
    /// Owning record's stable identifier.
    pub record_id: String,
    /// Index CSV column the URL came from.
    pub column: String,
    /// The download URL.
    pub url: String,
    /// The name whose letter scheme was exhausted.
    pub name: String,
}

/// One task's entry in a conflict.
#[derive(Debug, Clone)]
pub struct ConflictClaim {
    /// Owning record's stable identifier.
    pub record_id: String,
    /// Index CSV column the URL came from.
    pub column: String,
    /// The download URL claiming the name.
    pub url: String,
    /// The final name, or `None` when the claim ended in an anomaly.
    pub resolved: Option<String>,
    /// Disambiguator the claim received.
    pub tag: Disambiguator,
}

/// A name claimed by more than one task and how each claim was settled.
#[derive(Debug, Clone)]
pub struct Conflict {
    /// The contested native or prefixed name.
    pub name: String,
    /// Every claim, in assignment order.
    pub claims: Vec<ConflictClaim>,
}

/// All collisions observed during assignment, plus naming anomalies.
#[derive(Debug, Default)]
pub struct ConflictReport {
    /// Contested names in lexical order.
    pub conflicts: Vec<Conflict>,
    /// Tasks left unassigned because the letter scheme was exhausted.
    pub anomalies: Vec<NamingAnomaly>,
}

impl ConflictReport {
    /// Whether anything collided or failed to resolve.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty() && self.anomalies.is_empty()
    }
}

/// The complete result of the assignment pass.
#[derive(Debug)]
pub struct NamingPlan {
    /// Assignments in index order (record, then column).
    pub assignments: Vec<Assignment>,
    /// Collision and anomaly report.
    pub report: ConflictReport,
}

/// Working entry carried between the two passes.
struct Candidate {
    record_id: String,
    column: String,
    column_index: usize,
    url: String,
    native: String,
    candidate: String,
    prefixed: bool,
}

/// Computes the filename assignment for every download task in the index.
///
/// The returned mapping is injective: no two assignments share a filename.
/// Tasks whose collision group exhausts the letter scheme are reported as
/// anomalies and receive no assignment.
#[must_use]
pub fn assign_filenames(index: &Index) -> NamingPlan {
    // Pass 1: derive native names and apply per-record title prefixes.
    let mut candidates: Vec<Candidate> = Vec::new();
    for record in index.records() {
        let prefix = if record.downloads.len() > 1 {
            title_prefix(&record.title)
        } else {
            None
        };
        for (column_index, download) in record.downloads.iter().enumerate() {
            let native = native_filename(&download.url).unwrap_or_else(|| {
                format!(
                    "{}_{}.bin",
                    sanitize_filename(&record.id),
                    column_index + 1
                )
            });
            let (candidate, prefixed) = match &prefix {
                Some(p) => (format!("{p}_{native}"), true),
                None => (native.clone(), false),
            };
            candidates.push(Candidate {
                record_id: record.id.clone(),
                column: download.column.clone(),
                column_index,
                url: download.url.clone(),
                native,
                candidate,
                prefixed,
            });
        }
    }

    // Group tasks by the name they claim after prefixing.
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, c) in candidates.iter().enumerate() {
        groups.entry(c.candidate.clone()).or_default().push(i);
    }

    // Uncontested names are final and reserve their spelling before any
    // letter suffix is chosen.
    let mut used: HashSet<String> = groups
        .iter()
        .filter(|(_, claimants)| claimants.len() == 1)
        .map(|(name, _)| name.clone())
        .collect();

    let mut resolved: Vec<Option<(String, Disambiguator)>> = vec![None; candidates.len()];
    let mut anomalies: Vec<NamingAnomaly> = Vec::new();

    for (name, claimants) in &groups {
        if claimants.len() == 1 {
            let i = claimants[0];
            let tag = if candidates[i].prefixed {
                Disambiguator::TitlePrefixed
            } else {
                Disambiguator::None
            };
            resolved[i] = Some((name.clone(), tag));
            continue;
        }

        // Letter pass: stable order by record identifier, then column order.
        let mut ordered = claimants.clone();
        ordered.sort_by(|&a, &b| {
            (&candidates[a].record_id, candidates[a].column_index)
                .cmp(&(&candidates[b].record_id, candidates[b].column_index))
        });

        let (stem, extension) = split_stem_extension(name);
        let mut letters = (0..LETTER_SUFFIXES).map(|i| (b'a' + i as u8) as char);
        for &i in &ordered {
            let assigned = letters.by_ref().find_map(|letter| {
                let lettered = format!("{stem}_{letter}{extension}");
                (!used.contains(&lettered)).then_some(lettered)
            });
            match assigned {
                Some(lettered) => {
                    used.insert(lettered.clone());
                    let tag = if candidates[i].prefixed {
                        Disambiguator::TitlePrefixedLettered
                    } else {
                        Disambiguator::Lettered
                    };
                    resolved[i] = Some((lettered, tag));
                }
                None => {
                    warn!(
                        name = %name,
                        record_id = %candidates[i].record_id,
                        column = %candidates[i].column,
                        "letter suffixes exhausted; task left unassigned"
                    );
                    anomalies.push(NamingAnomaly {
                        record_id: candidates[i].record_id.clone(),
                        column: candidates[i].column.clone(),
                        url: candidates[i].url.clone(),
                        name: name.clone(),
                    });
                }
            }
        }
    }

    let report = build_report(&candidates, &groups, &resolved, anomalies);

    let assignments = candidates
        .iter()
        .enumerate()
        .filter_map(|(i, c)| {
            resolved[i].as_ref().map(|(filename, tag)| Assignment {
                record_id: c.record_id.clone(),
                column: c.column.clone(),
                url: c.url.clone(),
                filename: filename.clone(),
                tag: *tag,
            })
        })
        .collect();

    NamingPlan {
        assignments,
        report,
    }
}

/// Assembles the conflict report: one entry per contested native name, plus
/// entries for prefixed names that still collided.
fn build_report(
    candidates: &[Candidate],
    candidate_groups: &BTreeMap<String, Vec<usize>>,
    resolved: &[Option<(String, Disambiguator)>],
    anomalies: Vec<NamingAnomaly>,
) -> ConflictReport {
    let mut native_groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, c) in candidates.iter().enumerate() {
        native_groups.entry(c.native.clone()).or_default().push(i);
    }

    let mut entries: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (name, claimants) in native_groups {
        if claimants.len() > 1 {
            entries.insert(name, claimants);
        }
    }
    for (name, claimants) in candidate_groups {
        if claimants.len() > 1 {
            entries.entry(name.clone()).or_insert_with(|| claimants.clone());
        }
    }

    let conflicts = entries
        .into_iter()
        .map(|(name, claimants)| Conflict {
            name,
            claims: claimants
                .into_iter()
                .map(|i| ConflictClaim {
                    record_id: candidates[i].record_id.clone(),
                    column: candidates[i].column.clone(),
                    url: candidates[i].url.clone(),
                    resolved: resolved[i].as_ref().map(|(f, _)| f.clone()),
                    tag: resolved[i]
                        .as_ref()
                        .map_or(Disambiguator::None, |(_, t)| *t),
                })
                .collect(),
        })
        .collect();

    ConflictReport {
        conflicts,
        anomalies,
    }
}
