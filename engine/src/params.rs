// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Engine parameters.

use derive_builder::Builder;
use idalloc::PoolGeometry;
use std::fmt::Display;

pub const DEFAULT_MAX_READ_RECORDS: usize = 10_000;
pub const DEFAULT_RENAME_PREFIX: &str = "ren_";

/// Parameters of a [`crate::ConfigEngine`]. N.B. we derive a builder type
/// `EngineParamsBuilder` and provide defaults for each field.
#[derive(Builder, Clone, Debug, PartialEq, Eq)]
pub struct EngineParams {
    #[builder(default = PoolGeometry::vbid())]
    pub vbid_pool: PoolGeometry,

    #[builder(default = PoolGeometry::gvtnid())]
    pub gvtnid_pool: PoolGeometry,

    /// Cap on the rows returned by one sibling read.
    #[builder(default = DEFAULT_MAX_READ_RECORDS)]
    pub max_read_records: usize,

    /// Audit diffs leave out rows flagged as changed.
    #[builder(default = true)]
    pub audit_skip_changed: bool,

    /// Import diffs honour the changed flag instead of comparing whole rows.
    #[builder(default = false)]
    pub import_flag_aware: bool,

    /// Rename colliding vnodes on import instead of failing the merge.
    #[builder(default = true)]
    pub auto_rename: bool,

    #[builder(setter(into), default = DEFAULT_RENAME_PREFIX.to_string())]
    pub rename_prefix: String,

    /// Tracing configuration, as `tag=level,...`.
    #[builder(setter(into, strip_option), default)]
    pub tracing: Option<String>,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            vbid_pool: PoolGeometry::vbid(),
            gvtnid_pool: PoolGeometry::gvtnid(),
            max_read_records: DEFAULT_MAX_READ_RECORDS,
            audit_skip_changed: true,
            import_flag_aware: false,
            auto_rename: true,
            rename_prefix: DEFAULT_RENAME_PREFIX.to_string(),
            tracing: None,
        }
    }
}

fn geometry(g: &PoolGeometry) -> String {
    match g.bucket_rows {
        Some(b) => format!("{} labels, {} rows, buckets of {b} rows", g.bits, g.rows),
        None => format!("{} labels, {} rows", g.bits, g.rows),
    }
}

impl Display for EngineParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        writeln!(f, "Engine config")?;
        writeln!(f, "  vbid pool       : {}", geometry(&self.vbid_pool))?;
        writeln!(f, "  gvtnid pool     : {}", geometry(&self.gvtnid_pool))?;
        writeln!(f, "  max read records: {}", self.max_read_records)?;
        writeln!(f, "  audit skips chg : {}", self.audit_skip_changed)?;
        writeln!(f, "  flag-aware impt : {}", self.import_flag_aware)?;
        writeln!(
            f,
            "  auto rename     : {} (prefix '{}')",
            self.auto_rename, self.rename_prefix
        )?;
        writeln!(
            f,
            "  tracing         : {}",
            self.tracing.as_deref().unwrap_or("-")
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builder_defaults_match_default() {
        let built = EngineParamsBuilder::default().build().unwrap();
        assert_eq!(built, EngineParams::default());
        assert_eq!(built.gvtnid_pool.bucket_count(), 16);
    }

    #[test]
    fn builder_overrides() {
        let params = EngineParamsBuilder::default()
            .auto_rename(false)
            .rename_prefix("imp_")
            .tracing("engine=debug")
            .max_read_records(5usize)
            .build()
            .unwrap();
        assert!(!params.auto_rename);
        assert_eq!(params.rename_prefix, "imp_");
        assert_eq!(params.tracing.as_deref(), Some("engine=debug"));
        assert_eq!(params.max_read_records, 5);
        assert!(params.to_string().contains("prefix 'imp_'"));
    }
}
