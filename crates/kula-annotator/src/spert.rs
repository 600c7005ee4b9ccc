//! SpERT dataset export
//!
//! Turns approved records into the JSON layout SpERT trains on: one
//! document per record with whitespace tokens, token-span entities, and at
//! most one head-to-tail relation, plus a `types.json` describing every
//! entity and relation type seen.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use kula_core::{ExportConfig, KulaError, Record, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Direction tag SpERT expects on relations
const DIRECTION_L2R: &str = "L2R";

/// Stratum of documents without a relation
const NO_RELATION: &str = "NoRelation";

// ============================================================================
// Document Types
// ============================================================================

/// Entity as a token span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpertEntity {
    pub id: usize,
    pub start: usize,
    pub end: usize,
    #[serde(rename = "type")]
    pub entity_type: String,
}

/// Relation between two entities of the same document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpertRelation {
    pub head: usize,
    pub tail: usize,
    #[serde(rename = "type")]
    pub relation_type: String,
    pub direction: String,
}

/// One training document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpertDocument {
    pub tokens: Vec<String>,
    pub entities: Vec<SpertEntity>,
    pub relations: Vec<SpertRelation>,
}

impl SpertDocument {
    /// Build a document from an annotated record
    ///
    /// Entities are matched against the sentence tokens; an entity that is
    /// blank, unlabeled, or not found is left out, and the relation is only
    /// kept when both entities made it in.
    pub fn from_record(record: &Record) -> Self {
        let tokens: Vec<String> = record
            .sentence
            .split_whitespace()
            .map(String::from)
            .collect();

        let mut entities = Vec::new();
        for (text, label) in [
            (&record.entity1, &record.entity1_label),
            (&record.entity2, &record.entity2_label),
        ] {
            let entity_tokens: Vec<&str> = text.split_whitespace().collect();
            if entity_tokens.is_empty() || label.trim().is_empty() {
                continue;
            }
            if let Some(start) = find_token_span(&tokens, &entity_tokens) {
                entities.push(SpertEntity {
                    id: entities.len(),
                    start,
                    end: start + entity_tokens.len(),
                    entity_type: label.trim().to_string(),
                });
            }
        }

        let mut relations = Vec::new();
        let relation = record.relation.trim();
        if entities.len() == 2 && !relation.is_empty() {
            relations.push(SpertRelation {
                head: 0,
                tail: 1,
                relation_type: relation.to_string(),
                direction: DIRECTION_L2R.to_string(),
            });
        }

        Self {
            tokens,
            entities,
            relations,
        }
    }
}

/// Position of the first occurrence of `needle` in `tokens`
pub fn find_token_span<T: AsRef<str>>(tokens: &[T], needle: &[&str]) -> Option<usize> {
    if needle.is_empty() || needle.len() > tokens.len() {
        return None;
    }
    tokens.windows(needle.len()).position(|window| {
        window
            .iter()
            .zip(needle)
            .all(|(token, wanted)| token.as_ref() == *wanted)
    })
}

// ============================================================================
// Types File
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeInfo {
    pub short: String,
    pub verbose: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationTypeInfo {
    pub short: String,
    pub verbose: String,
    pub symmetric: bool,
}

/// Contents of `types.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpertTypes {
    pub entities: BTreeMap<String, EntityTypeInfo>,
    pub relations: BTreeMap<String, RelationTypeInfo>,
}

impl SpertTypes {
    /// Collect every type used by `documents`
    pub fn collect(documents: &[SpertDocument]) -> Self {
        let entity_types: BTreeSet<&str> = documents
            .iter()
            .flat_map(|d| d.entities.iter().map(|e| e.entity_type.as_str()))
            .collect();
        let relation_types: BTreeSet<&str> = documents
            .iter()
            .flat_map(|d| d.relations.iter().map(|r| r.relation_type.as_str()))
            .collect();

        Self {
            entities: entity_types
                .into_iter()
                .map(|t| {
                    let info = EntityTypeInfo {
                        short: t.to_string(),
                        verbose: t.to_string(),
                    };
                    (t.to_string(), info)
                })
                .collect(),
            relations: relation_types
                .into_iter()
                .map(|t| {
                    let info = RelationTypeInfo {
                        short: t.to_string(),
                        verbose: t.to_string(),
                        symmetric: false,
                    };
                    (t.to_string(), info)
                })
                .collect(),
        }
    }
}

// ============================================================================
// Splits
// ============================================================================

/// Train/dev/test partition of the documents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpertSplits {
    pub train: Vec<SpertDocument>,
    pub dev: Vec<SpertDocument>,
    pub test: Vec<SpertDocument>,
}

impl SpertSplits {
    /// Shuffle with a fixed seed and cut into train/dev/test
    ///
    /// When the documents carry more than one stratum (see [`stratum`]), each
    /// stratum gives up its own rounded-up held-out share, so rare relation
    /// types still reach dev/test. The held-out documents are then halved
    /// without stratification; dev gets the smaller half.
    pub fn split(documents: Vec<SpertDocument>, train_ratio: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let held_out_ratio = 1.0 - train_ratio;

        let mut strata: BTreeMap<String, Vec<SpertDocument>> = BTreeMap::new();
        for document in documents {
            strata.entry(stratum(&document)).or_default().push(document);
        }

        let (train, mut held_out) = if strata.len() > 1 {
            let mut train = Vec::new();
            let mut held_out = Vec::new();
            for mut group in strata.into_values() {
                group.shuffle(&mut rng);
                let cut = group.len() - held_out_count(group.len(), held_out_ratio);
                held_out.extend(group.split_off(cut));
                train.extend(group);
            }
            train.shuffle(&mut rng);
            held_out.shuffle(&mut rng);
            (train, held_out)
        } else {
            let mut documents: Vec<SpertDocument> = strata.into_values().flatten().collect();
            documents.shuffle(&mut rng);
            let cut = documents.len() - held_out_count(documents.len(), held_out_ratio);
            let held_out = documents.split_off(cut);
            (documents, held_out)
        };

        let test = held_out.split_off(held_out.len() / 2);
        Self {
            train,
            dev: held_out,
            test,
        }
    }

    /// Relation type counts per split, in train/dev/test order
    pub fn relation_counts(&self) -> [BTreeMap<String, usize>; 3] {
        [
            count_relations(&self.train),
            count_relations(&self.dev),
            count_relations(&self.test),
        ]
    }
}

/// Split label of a document: its first relation type, or `NoRelation`
pub fn stratum(document: &SpertDocument) -> String {
    document
        .relations
        .first()
        .map(|r| r.relation_type.clone())
        .unwrap_or_else(|| NO_RELATION.to_string())
}

fn held_out_count(len: usize, held_out_ratio: f64) -> usize {
    ((held_out_ratio * len as f64).ceil() as usize).min(len)
}

/// Occurrences of each relation type
pub fn count_relations(documents: &[SpertDocument]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for relation in documents.iter().flat_map(|d| &d.relations) {
        *counts.entry(relation.relation_type.clone()).or_insert(0) += 1;
    }
    counts
}

// ============================================================================
// Exporter
// ============================================================================

/// What an export wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub out_dir: PathBuf,
    pub train_count: usize,
    pub dev_count: usize,
    pub test_count: usize,
    pub entity_types: usize,
    pub relation_types: usize,
    pub relation_counts: [BTreeMap<String, usize>; 3],
}

/// Writes SpERT splits and types for a set of records
#[derive(Debug, Clone)]
pub struct SpertExporter {
    train_ratio: f64,
    seed: u64,
}

impl SpertExporter {
    pub fn new() -> Self {
        Self::from_config(&ExportConfig::default())
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            train_ratio: config.train_ratio,
            seed: config.seed,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Convert `records` and write the four JSON files into `out_dir`
    pub fn export(&self, records: &[Record], out_dir: &Path) -> Result<ExportReport> {
        let documents: Vec<SpertDocument> =
            records.iter().map(SpertDocument::from_record).collect();
        let types = SpertTypes::collect(&documents);
        let splits = SpertSplits::split(documents, self.train_ratio, self.seed);

        std::fs::create_dir_all(out_dir)
            .map_err(|e| KulaError::Export(format!("{}: {e}", out_dir.display())))?;

        write_json(&out_dir.join("train.json"), &splits.train)?;
        write_json(&out_dir.join("dev.json"), &splits.dev)?;
        write_json(&out_dir.join("test.json"), &splits.test)?;
        write_json(&out_dir.join("types.json"), &types)?;

        let report = ExportReport {
            out_dir: out_dir.to_path_buf(),
            train_count: splits.train.len(),
            dev_count: splits.dev.len(),
            test_count: splits.test.len(),
            entity_types: types.entities.len(),
            relation_types: types.relations.len(),
            relation_counts: splits.relation_counts(),
        };

        tracing::info!(
            "Exported {} documents to {} ({} entity types, {} relation types)",
            records.len(),
            out_dir.display(),
            report.entity_types,
            report.relation_types
        );
        Ok(report)
    }
}

impl Default for SpertExporter {
    fn default() -> Self {
        Self::new()
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| KulaError::Export(format!("{}: {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .map_err(|e| KulaError::Export(format!("{}: {e}", path.display())))
}

// ============================================================================
// Tests
// ============================================================================
