// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Link-time registry of tracing targets.

use crate::LevelFilter;
use linkme::distributed_slice;

/// A tracing target as declared in source code.
pub struct TargetDecl {
    pub(crate) target: &'static str,
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: &'static [&'static str],
    pub(crate) custom: bool,
}

impl TargetDecl {
    pub const fn new(
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
        custom: bool,
    ) -> Self {
        Self {
            target,
            name,
            level,
            tags,
            custom,
        }
    }
}

#[distributed_slice]
pub static TRACE_TARGETS: [TargetDecl];

#[doc(hidden)]
#[macro_export]
macro_rules! trace_target_deps {
    () => {
        use linkme::distributed_slice;
        use $crate::LevelFilter;
        use $crate::targets::{TRACE_TARGETS, TargetDecl};
    };
}

/// Declare the tracing target of the calling module, with a short name, a default level and tags.
///
/// The expansion lives in an anonymous const scope, so the macro can be used several times in a
/// crate without clashing statics. Callers need `linkme` among their dependencies.
#[macro_export]
macro_rules! trace_target {
    ($name:expr, $level:expr, $tags:expr) => {
        const _: () = {
            use $crate::trace_target_deps;
            trace_target_deps!();

            #[distributed_slice(TRACE_TARGETS)]
            static TRACE_TGT: TargetDecl =
                TargetDecl::new(module_path!(), $name, $level, $tags, false);
        };
    };
}

/// Declare a tracing target with an explicit target string, to be used with `target:` in the
/// tracing macros.
#[macro_export]
macro_rules! custom_target {
    ($target:expr, $level:expr, $tags:expr) => {
        const _: () = {
            use $crate::trace_target_deps;
            trace_target_deps!();

            #[distributed_slice(TRACE_TARGETS)]
            static TRACE_TGT: TargetDecl = TargetDecl::new($target, $target, $level, $tags, true);
        };
    };
}
