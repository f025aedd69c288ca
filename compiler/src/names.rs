//! Template naming: anonymous subtemplate numbering, namespace prefixes and
//! region name mangling.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Every anonymous subtemplate name starts with this.
pub const SUBTEMPLATE_PREFIX: &str = "_sub";

const REGION_PREFIX: &str = "/region__";

/// Hands out `_sub1`, `_sub2`, ... in request order.
///
/// One allocator is shared by every template compiled through the same
/// [`Compiler`](crate::Compiler). The counter is atomic, so concurrent
/// compiles get distinct names, but the numbering they see depends on
/// scheduling; tests that pin names use their own allocator.
#[derive(Debug, Default)]
pub struct NameAllocator {
    issued: AtomicUsize,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_subtemplate_name(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{SUBTEMPLATE_PREFIX}{n}")
    }

    /// How many names have been handed out since the last reset.
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::Relaxed)
    }

    /// Restart numbering at `_sub1`.
    pub fn reset(&self) {
        self.issued.store(0, Ordering::Relaxed);
    }
}

/// Namespace of a template name, always ending in `/`.
///
/// `/a/b` → `/a/`, `/b` → `/`, `b` → `/`.
pub fn prefix_of(name: &str) -> String {
    let mut prefix = match name.rfind('/') {
        Some(0) => "/".to_owned(),
        Some(slash) => name[..slash].to_owned(),
        None => String::new(),
    };
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

/// Internal name of region `region` declared in template `enclosing`.
pub fn mangled_region_name(enclosing: &str, region: &str) -> String {
    if enclosing.starts_with('/') {
        format!("{REGION_PREFIX}{enclosing}__{region}")
    } else {
        format!("{REGION_PREFIX}/{enclosing}__{region}")
    }
}

/// `enclosing.region` for a mangled region name; other names are returned
/// unchanged.
pub fn unmangled_template_name(name: &str) -> String {
    let Some(rest) = name.strip_prefix(REGION_PREFIX) else {
        return name.to_owned();
    };
    match rest.rfind("__") {
        Some(split) => format!("{}.{}", &rest[..split], &rest[split + 2..]),
        None => name.to_owned(),
    }
}

pub fn is_subtemplate_name(name: &str) -> bool {
    name.starts_with(SUBTEMPLATE_PREFIX)
}
