//! File discovery seam
//!
//! Glob matching of `definitions`, `tests` and `templates` patterns is the
//! host's job. specenv only asks for the files behind a set of patterns.

use std::path::PathBuf;

use crate::error::Result;

pub trait Discovery {
    /// Files matching any of `patterns`, in the order they should be used
    fn discover(&self, patterns: &[String]) -> Result<Vec<PathBuf>>;
}

impl<F> Discovery for F
where
    F: Fn(&[String]) -> Result<Vec<PathBuf>>,
{
    fn discover(&self, patterns: &[String]) -> Result<Vec<PathBuf>> {
        self(patterns)
    }
}
