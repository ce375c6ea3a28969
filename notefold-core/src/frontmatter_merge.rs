//! Front matter merge strategies.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::ComposeError;

const TITLE_KEY: &str = "title";
const MERGED_KEY: &str = "__merged";
const FROM_KEY: &str = "__from";
const DATE_KEY: &str = "__mergeDate";

/// How the incoming front matter combines with the target's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrontmatterStrategy {
    KeepOriginal,
    #[default]
    MergePreferNew,
    MergePreferOriginal,
    ReplaceWithNew,
    PreserveBoth,
}

impl FrontmatterStrategy {
    pub const ALL: [FrontmatterStrategy; 5] = [
        Self::KeepOriginal,
        Self::MergePreferNew,
        Self::MergePreferOriginal,
        Self::ReplaceWithNew,
        Self::PreserveBoth,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::KeepOriginal => "keep-original",
            Self::MergePreferNew => "merge-prefer-new",
            Self::MergePreferOriginal => "merge-prefer-original",
            Self::ReplaceWithNew => "replace-with-new",
            Self::PreserveBoth => "preserve-both",
        }
    }
}

impl fmt::Display for FrontmatterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrontmatterStrategy {
    type Err = ComposeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| ComposeError::InvalidConfig(format!("unknown front matter strategy: {s}")))
    }
}

/// Facts recorded by [`FrontmatterStrategy::PreserveBoth`].
#[derive(Debug, Clone)]
pub struct MergeContext<'a> {
    pub from_path: &'a str,
    pub merge_date: String,
}

/// Combine `original` (target) and `incoming` (source) front matter.
///
/// Whatever the strategy, the target's `title` survives untouched, and a title
/// the target did not have is never introduced. Absent incoming front matter
/// leaves the target as it was.
pub fn merge_frontmatter(
    original: Option<&Mapping>,
    incoming: Option<&Mapping>,
    strategy: FrontmatterStrategy,
    ctx: &MergeContext<'_>,
) -> Option<Mapping> {
    let Some(incoming) = incoming else {
        return original.cloned();
    };

    let mut merged = match strategy {
        FrontmatterStrategy::KeepOriginal => original.cloned(),
        FrontmatterStrategy::MergePreferNew => Some(deep_merge(original, incoming, true)),
        FrontmatterStrategy::MergePreferOriginal => Some(deep_merge(original, incoming, false)),
        FrontmatterStrategy::ReplaceWithNew => Some(incoming.clone()),
        FrontmatterStrategy::PreserveBoth => Some(preserve_both(original, incoming, ctx)),
    };

    match original.and_then(|fm| fm.get(TITLE_KEY)) {
        Some(title) => {
            merged
                .get_or_insert_with(Mapping::new)
                .insert(Value::from(TITLE_KEY), title.clone());
        }
        None => {
            if let Some(map) = merged.as_mut() {
                map.remove(TITLE_KEY);
            }
        }
    }

    merged
}

fn deep_merge(original: Option<&Mapping>, incoming: &Mapping, prefer_new: bool) -> Mapping {
    let mut result = original.cloned().unwrap_or_default();
    merge_into(&mut result, incoming, prefer_new);
    result
}

fn merge_into(base: &mut Mapping, incoming: &Mapping, prefer_new: bool) {
    for (key, value) in incoming {
        let Some(slot) = base.get_mut(key).filter(|v| !v.is_null()) else {
            base.insert(key.clone(), value.clone());
            continue;
        };
        match (slot, value) {
            (Value::Mapping(existing), Value::Mapping(other)) => {
                merge_into(existing, other, prefer_new);
            }
            (Value::Sequence(existing), Value::Sequence(other)) => {
                let mut combined = Vec::with_capacity(existing.len() + other.len());
                for item in existing.iter().chain(other) {
                    if !combined.contains(item) {
                        combined.push(item.clone());
                    }
                }
                *existing = combined;
            }
            (slot, _) => {
                if prefer_new {
                    *slot = value.clone();
                }
            }
        }
    }
}

fn preserve_both(original: Option<&Mapping>, incoming: &Mapping, ctx: &MergeContext<'_>) -> Mapping {
    let mut result = original.cloned().unwrap_or_default();

    let key = std::iter::once(MERGED_KEY.to_string())
        .chain((0..).map(|n| format!("{MERGED_KEY}{n}")))
        .find(|candidate| !result.contains_key(candidate.as_str()))
        .unwrap_or_else(|| MERGED_KEY.to_string());

    let mut nested = Mapping::new();
    nested.insert(Value::from(FROM_KEY), Value::from(ctx.from_path));
    nested.insert(Value::from(DATE_KEY), Value::from(ctx.merge_date.clone()));
    for (k, v) in incoming {
        nested.insert(k.clone(), v.clone());
    }

    result.insert(Value::from(key), Value::Mapping(nested));
    result
}
