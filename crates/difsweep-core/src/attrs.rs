//! Declarative parameter tables and their Cartesian product.

use crate::config::ConfigSource;
use crate::errors::{ErrorInfo, SweepError};
use crate::params::ParamValue;

/// Declares one tunable parameter of a stage: the config key it is read
/// from, the token parser producing its typed values, and the setter that
/// applies a chosen value onto the stage options object.
///
/// The setter is the explicit name→field registry: binding happens through
/// these function pointers, never through reflective attribute lookup.
pub struct AttrSpec<O> {
    /// Config key within the stage section.
    pub name: &'static str,
    /// Pure token parser; fails with a value error on malformed tokens.
    pub parse: fn(&str) -> Result<ParamValue, SweepError>,
    /// Writes one parsed value onto the options object.
    pub set: fn(&mut O, &ParamValue),
}

impl<O> Clone for AttrSpec<O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O> Copy for AttrSpec<O> {}

/// Parameter table for one stage: every spec's parsed value sequence, plus
/// the Cartesian product over them.
///
/// Built once per sweep from a config section and immutable thereafter.
/// Token order and duplicates are preserved exactly as written in the
/// config entry. An empty entry yields an empty value sequence, which makes
/// the product empty — a valid zero-run condition, not an error.
pub struct AttrTable<O> {
    specs: Vec<AttrSpec<O>>,
    values: Vec<Vec<ParamValue>>,
}

impl<O> AttrTable<O> {
    /// Resolves every spec against the named config section, parsing each
    /// whitespace-separated token independently. Fails before any run
    /// executes: on a missing section, a missing key, or a malformed token.
    pub fn from_config(
        cfg: &ConfigSource,
        section: &str,
        specs: &[AttrSpec<O>],
    ) -> Result<Self, SweepError> {
        let entries = cfg.section(section)?;
        let mut values = Vec::with_capacity(specs.len());
        for spec in specs {
            let raw = entries.get(spec.name).ok_or_else(|| {
                SweepError::Config(
                    ErrorInfo::new("config-missing-key", "section has no entry for parameter")
                        .with_context("section", section)
                        .with_context("key", spec.name),
                )
            })?;
            let mut seq = Vec::new();
            for token in raw.split_whitespace() {
                let value = (spec.parse)(token).map_err(|err| match err {
                    SweepError::Value(info) => SweepError::Value(
                        info.with_context("section", section)
                            .with_context("key", spec.name),
                    ),
                    other => other,
                })?;
                seq.push(value);
            }
            values.push(seq);
        }
        Ok(Self {
            specs: specs.to_vec(),
            values,
        })
    }

    /// Declared parameter names, in spec order.
    pub fn param_names(&self) -> Vec<&'static str> {
        self.specs.iter().map(|spec| spec.name).collect()
    }

    /// Parsed value sequences, one per spec.
    pub fn values(&self) -> &[Vec<ParamValue>] {
        &self.values
    }

    /// Size of the Cartesian product over all value sequences.
    pub fn combo_count(&self) -> usize {
        self.values.iter().map(Vec::len).product()
    }

    /// Decodes combination `idx` of the product by mixed-radix index: the
    /// first spec varies slowest, the last fastest. This keeps the product
    /// replayable without materializing it.
    pub fn combo_at(&self, idx: usize) -> Vec<ParamValue> {
        debug_assert!(idx < self.combo_count(), "combination index out of range");
        let mut rem = idx;
        let mut picks = Vec::with_capacity(self.values.len());
        for seq in self.values.iter().rev() {
            picks.push(seq[rem % seq.len()].clone());
            rem /= seq.len();
        }
        picks.reverse();
        picks
    }

    /// Lazy, restartable enumeration of the full product in lexicographic
    /// order over spec index. Two independent iterations yield identical
    /// sequences.
    pub fn product(&self) -> GridProduct<'_, O> {
        GridProduct {
            table: self,
            next: 0,
            total: self.combo_count(),
        }
    }

    /// Applies one combination onto the options object by declared name.
    ///
    /// A combination whose arity differs from the spec table is a
    /// programming error, not a runtime-reported failure. Value semantics
    /// are never validated here; that belongs to the pipeline.
    pub fn bind(&self, target: &mut O, combo: &[ParamValue]) {
        assert_eq!(
            combo.len(),
            self.specs.len(),
            "combination arity does not match the spec table"
        );
        for (spec, value) in self.specs.iter().zip(combo) {
            (spec.set)(target, value);
        }
    }
}

/// Iterator over the Cartesian product of an [`AttrTable`].
pub struct GridProduct<'a, O> {
    table: &'a AttrTable<O>,
    next: usize,
    total: usize,
}

impl<O> Iterator for GridProduct<'_, O> {
    type Item = Vec<ParamValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let combo = self.table.combo_at(self.next);
        self.next += 1;
        Some(combo)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total - self.next;
        (left, Some(left))
    }
}

impl<O> ExactSizeIterator for GridProduct<'_, O> {}
