//! Candidate collection, scoring and selection.
//!
//! A source file can appear in several compile entries (debug/release,
//! test builds). Each matching entry becomes a [`CompileCandidate`]; exact
//! matches start at 100, same-stem siblings of a header at 50, and every
//! required flag found in the command line adds one.

use crate::compile_db::CompileCommandEntry;
use crate::errors::ErrorCode;
use crate::util::{is_header, is_source, normalize_lexically, tokenize_command};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

const EXACT_SCORE: u32 = 100;
const SIBLING_SCORE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    /// The entry compiles the target itself.
    Exact,
    /// The entry compiles a same-stem source next to a target header.
    Sibling,
}

impl CandidateKind {
    const fn base_score(self) -> u32 {
        match self {
            Self::Exact => EXACT_SCORE,
            Self::Sibling => SIBLING_SCORE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileCandidate {
    pub entry: CompileCommandEntry,
    pub cmd_str: String,
    pub score: u32,
    pub kind: CandidateKind,
}

impl CompileCandidate {
    fn new(entry: CompileCommandEntry, kind: CandidateKind, required_flags: &[String]) -> Self {
        let cmd_str = entry.command_line();
        let matched = required_flags
            .iter()
            .filter(|flag| cmd_str.contains(flag.as_str()))
            .count();
        let score = kind
            .base_score()
            .saturating_add(u32::try_from(matched).unwrap_or(u32::MAX));
        Self {
            entry,
            cmd_str,
            score,
            kind,
        }
    }

    /// Points earned from required flags.
    pub fn bonus(&self) -> u32 {
        self.score - self.kind.base_score()
    }
}

/// Flags one candidate has that not every candidate shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDiff {
    pub file: String,
    pub score: u32,
    pub unique_flags: Vec<String>,
}

impl fmt::Display for CandidateDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unique_flags.is_empty() {
            write!(f, "[score {}] {}: (identical to others)", self.score, self.file)
        } else {
            write!(
                f,
                "[score {}] {}: {}",
                self.score,
                self.file,
                self.unique_flags.join(" ")
            )
        }
    }
}

/// Selection degraded but still produced a winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionWarning {
    /// Selector flags were given and none matched.
    TooTight,
    /// Several candidates tied for the best score.
    TooLoose {
        count: usize,
        diffs: Vec<CandidateDiff>,
    },
}

impl SelectionWarning {
    /// Both kinds mean the winner was a default rather than a clear best.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::ResolveAmbiguous
    }
}

impl fmt::Display for SelectionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooTight => write!(
                f,
                "flags are too tight: no candidate matched the selector, defaulting to first"
            ),
            Self::TooLoose { count, .. } => write!(
                f,
                "flags are too loose: {count} equally plausible contexts, defaulting to first"
            ),
        }
    }
}

/// Outcome of candidate selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub winner: CompileCandidate,
    pub candidates: Vec<CompileCandidate>,
    pub warnings: Vec<SelectionWarning>,
}

fn resolved(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| normalize_lexically(path))
}

fn is_sibling(target: &Path, file: &Path) -> bool {
    is_source(file)
        && file.parent() == target.parent()
        && file.file_stem().is_some()
        && file.file_stem() == target.file_stem()
}

/// Score every entry relevant to `target`. Exact matches come first, then
/// siblings, each in database order.
pub fn collect_candidates(
    target: &Path,
    entries: &[CompileCommandEntry],
    required_flags: &[String],
) -> Vec<CompileCandidate> {
    let target = resolved(target);
    let files: Vec<PathBuf> = entries.iter().map(|e| resolved(&e.file_path())).collect();

    let mut candidates: Vec<CompileCandidate> = entries
        .iter()
        .zip(&files)
        .filter(|(_, file)| **file == target)
        .map(|(entry, _)| CompileCandidate::new(entry.clone(), CandidateKind::Exact, required_flags))
        .collect();

    if is_header(&target) {
        candidates.extend(
            entries
                .iter()
                .zip(&files)
                .filter(|(_, file)| is_sibling(&target, file))
                .map(|(entry, _)| {
                    CompileCandidate::new(entry.clone(), CandidateKind::Sibling, required_flags)
                }),
        );
    }
    candidates
}

/// Pick the best candidate. `None` when there are no candidates.
pub fn select(candidates: Vec<CompileCandidate>, selectors_supplied: bool) -> Option<Selection> {
    let max = candidates.iter().map(|c| c.score).max()?;
    let winner = candidates.iter().find(|c| c.score == max)?.clone();

    let mut warnings = Vec::new();
    let best_bonus = candidates.iter().map(CompileCandidate::bonus).max();
    if selectors_supplied && best_bonus == Some(0) {
        warnings.push(SelectionWarning::TooTight);
    }
    let tied = candidates.iter().filter(|c| c.score == max).count();
    if tied > 1 {
        warnings.push(SelectionWarning::TooLoose {
            count: tied,
            diffs: candidate_diffs(&candidates),
        });
    }

    Some(Selection {
        winner,
        candidates,
        warnings,
    })
}

/// For each candidate: its flags minus the flags every candidate shares.
pub fn candidate_diffs(candidates: &[CompileCandidate]) -> Vec<CandidateDiff> {
    let sets: Vec<HashSet<String>> = candidates
        .iter()
        .map(|c| tokenize_command(&c.cmd_str).into_iter().collect())
        .collect();
    let Some((first, rest)) = sets.split_first() else {
        return Vec::new();
    };
    let common: HashSet<&String> = first
        .iter()
        .filter(|flag| rest.iter().all(|set| set.contains(*flag)))
        .collect();

    candidates
        .iter()
        .zip(&sets)
        .map(|(candidate, set)| CandidateDiff {
            file: candidate.entry.file.clone(),
            score: candidate.score,
            unique_flags: set
                .iter()
                .filter(|flag| !common.contains(flag))
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        })
        .collect()
}
