// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tracing runtime control.

use ordermap::OrderMap;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use thiserror::Error;
#[allow(unused)]
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, Registry, filter::LevelFilter, prelude::*, reload};

use crate::targets::TRACE_TARGETS;
use crate::trace_target;

trace_target!("tracectl", LevelFilter::INFO, &["upll"]);

/// Errors when parsing a tracing configuration string
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TraceCtlError {
    #[error("Invalid syntax '{0}': expected tag=level")]
    Syntax(String),
    #[error("Invalid level '{0}'")]
    BadLevel(String),
    #[error("Unknown tag '{0}'")]
    UnknownTag(String),
}

#[derive(Debug, Clone)]
pub struct TargetState {
    pub target: &'static str,
    pub name: &'static str,
    pub level: LevelFilter,
    pub tags: Vec<&'static str>,
    pub custom: bool,
}

impl TargetState {
    fn new(
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
        custom: bool,
    ) -> Self {
        // a target is always reachable through its own name
        let mut tags = tags.to_vec();
        if !tags.contains(&name) {
            tags.push(name);
        }
        Self {
            target,
            name,
            level,
            tags,
            custom,
        }
    }
}

#[derive(Debug)]
pub(crate) struct TargetTable {
    pub(crate) default: LevelFilter,
    pub(crate) targets: OrderMap<&'static str, TargetState>,
    pub(crate) tags: OrderMap<&'static str, BTreeSet<&'static str>>,
}

impl TargetTable {
    fn new(default: LevelFilter) -> Self {
        let mut table = Self {
            default,
            targets: OrderMap::new(),
            tags: OrderMap::new(),
        };
        for decl in TRACE_TARGETS {
            table.register(decl.target, decl.name, decl.level, decl.tags, decl.custom);
        }
        table
    }

    fn register(
        &mut self,
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
        custom: bool,
    ) {
        let state = TargetState::new(target, name, level, tags, custom);
        for tag in &state.tags {
            self.tags.entry(*tag).or_default().insert(target);
        }
        if let Some(prior) = self.targets.insert(target, state) {
            warn!("Tracing target {} declared more than once", prior.target);
        }
    }

    pub(crate) fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::new(self.default.to_string());
        for state in self.targets.values() {
            match format!("{}={}", state.target, state.level).parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => warn!("Skipping directive for target {}: {e}", state.target),
            }
        }
        filter
    }

    fn set_tag_level(&mut self, tag: &str, level: LevelFilter) -> usize {
        let Some(members) = self.tags.get(tag) else {
            return 0;
        };
        let mut changed = 0;
        for target in members {
            if let Some(state) = self.targets.get_mut(target)
                && state.level != level
            {
                state.level = level;
                changed += 1;
            }
        }
        changed
    }

    pub(crate) fn as_config_string(&self) -> String {
        let mut out = format!("default={}", self.default);
        for state in self.targets.values() {
            out += &format!(",{}={}", state.name, state.level);
        }
        out
    }
}

/// Owner of the tracing subscriber and of the per-target levels.
#[derive(Debug)]
pub struct TracingControl {
    table: Mutex<TargetTable>,
    reload: reload::Handle<EnvFilter, Registry>,
}

static TRACING_CONTROL: OnceLock<TracingControl> = OnceLock::new();

impl TracingControl {
    fn new() -> Self {
        let table = TargetTable::new(LevelFilter::INFO);
        let (filter, reload) = reload::Layer::new(table.env_filter());
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_line_number(true)
            .with_target(true)
            .with_thread_names(true)
            .with_level(true);

        // a subscriber may already be installed (e.g. by a test harness); we keep running
        // with our table so that levels can still be queried.
        if let Err(e) = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
        {
            eprintln!("Could not install tracing subscriber: {e}");
        }
        Self {
            table: Mutex::new(table),
            reload,
        }
    }

    /// Get the process-wide [`TracingControl`], creating it on first use.
    pub fn global() -> &'static TracingControl {
        TRACING_CONTROL.get_or_init(Self::new)
    }

    /// Create the [`TracingControl`] and optionally apply a `tag=level,...` configuration.
    pub fn init(config: Option<&str>) -> Result<&'static TracingControl, TraceCtlError> {
        let ctl = Self::global();
        if let Some(config) = config {
            ctl.setup_from_string(config)?;
        }
        Ok(ctl)
    }

    fn lock(&self) -> MutexGuard<'_, TargetTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reload(&self, table: &TargetTable) {
        if let Err(e) = self.reload.reload(table.env_filter()) {
            error!("Failed to reload tracing filter: {e}");
        }
    }

    #[allow(unused)]
    fn register(
        &self,
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) {
        let mut table = self.lock();
        table.register(target, name, level, tags, true);
        self.reload(&table);
    }

    pub fn set_tag_level(&self, tag: &str, level: LevelFilter) -> usize {
        let mut table = self.lock();
        let changed = table.set_tag_level(tag, level);
        if changed > 0 {
            self.reload(&table);
        }
        debug!("Log level for tag '{tag}' set to {level} ({changed} targets changed)");
        changed
    }

    pub fn set_default_level(&self, level: LevelFilter) {
        let mut table = self.lock();
        if table.default != level {
            table.default = level;
            self.reload(&table);
            info!("Default log level is now {level}");
        }
    }

    #[must_use]
    pub fn default_level(&self) -> LevelFilter {
        self.lock().default
    }

    fn parse_config(input: &str) -> Result<OrderMap<String, LevelFilter>, TraceCtlError> {
        let mut config = OrderMap::new();
        for item in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let Some((tag, level)) = item.split_once('=') else {
                return Err(TraceCtlError::Syntax(item.to_owned()));
            };
            let level = LevelFilter::from_str(level.trim())
                .map_err(|_| TraceCtlError::BadLevel(level.trim().to_owned()))?;
            config.insert(tag.trim().to_owned(), level);
        }
        Ok(config)
    }

    /// Apply a configuration made of comma-separated `tag=level` items. The pseudo-tags `default`
    /// and `all` set the default level and the level of every known target respectively.
    pub fn setup_from_string(&self, input: &str) -> Result<(), TraceCtlError> {
        let config = Self::parse_config(input)?;
        {
            let table = self.lock();
            if let Some(tag) = config
                .keys()
                .find(|t| *t != "default" && *t != "all" && !table.tags.contains_key(t.as_str()))
            {
                return Err(TraceCtlError::UnknownTag(tag.clone()));
            }
        }
        for (tag, level) in &config {
            match tag.as_str() {
                "default" => self.set_default_level(*level),
                "all" => {
                    let mut table = self.lock();
                    table.targets.values_mut().for_each(|t| t.level = *level);
                    self.reload(&table);
                }
                tag => {
                    self.set_tag_level(tag, *level);
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn target(&self, target: &str) -> Option<TargetState> {
        self.lock().targets.get(target).cloned()
    }

    #[must_use]
    pub fn targets_by_tag(&self, tag: &str) -> Vec<TargetState> {
        let table = self.lock();
        table
            .tags
            .get(tag)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|t| table.targets.get(t).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn as_config_string(&self) -> String {
        self.lock().as_config_string()
    }

    pub fn dump(&self) {
        let table = self.lock();
        info!("{table}");
    }
}
