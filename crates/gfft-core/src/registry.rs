#![forbid(unsafe_code)]

//! Kernel registry: `(length, scheme, precision)` to a callable kernel.
//!
//! Two tables, one per precision. A registry is immutable once built; every
//! lookup is a plain read, so one instance can serve any number of
//! concurrent compilations. [`KernelRegistry::global`] is the process-wide
//! instance, populated exactly once on first use; [`KernelRegistry::with_config`]
//! and [`KernelRegistryBuilder`] build explicit instances for injection.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use gfft_device::{KernelFn, Precision};
use gfft_runtime::{TraceEvent, record_trace};
use serde::{Deserialize, Serialize};

use crate::error::FftError;
use crate::kernels;
use crate::scheme::{ComputeScheme, KernelKey, KernelLength};

/// Prime radices the fused kernels are generated for.
pub const DEFAULT_RADICES: [usize; 6] = [2, 3, 5, 7, 11, 13];

/// Longest fused single-kernel transform in the default registry.
pub const DEFAULT_MAX_DIRECT_LENGTH: usize = 4096;

/// Which fused kernels a registry is populated with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub max_direct_length: usize,
    pub radices: Vec<usize>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_direct_length: DEFAULT_MAX_DIRECT_LENGTH,
            radices: DEFAULT_RADICES.to_vec(),
        }
    }
}

impl RegistryConfig {
    #[must_use]
    pub fn with_max_direct_length(mut self, max_direct_length: usize) -> Self {
        self.max_direct_length = max_direct_length;
        self
    }

    #[must_use]
    pub fn with_radices(mut self, radices: Vec<usize>) -> Self {
        self.radices = radices;
        self
    }

    /// Every length up to `max_direct_length` whose prime factors are all radices.
    #[must_use]
    pub fn direct_lengths(&self) -> Vec<usize> {
        (1..=self.max_direct_length)
            .filter(|&n| is_smooth(n, &self.radices))
            .collect()
    }
}

/// True when `n` factors completely over `radices`.
#[must_use]
pub fn is_smooth(mut n: usize, radices: &[usize]) -> bool {
    if n == 0 {
        return false;
    }
    for &r in radices.iter().filter(|&&r| r > 1) {
        while n.is_multiple_of(r) {
            n /= r;
        }
    }
    n == 1
}

/// Callable kernel entry plus a display name.
#[derive(Clone)]
pub struct KernelHandle {
    name: String,
    entry: KernelFn,
}

impl KernelHandle {
    #[must_use]
    pub fn new(name: impl Into<String>, entry: KernelFn) -> Self {
        Self {
            name: name.into(),
            entry,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn entry(&self) -> KernelFn {
        self.entry
    }
}

impl fmt::Debug for KernelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Outcome of a successful lookup: the key and a handle known to be callable.
#[derive(Debug, Clone)]
pub struct ResolvedKernel {
    pub key: KernelKey,
    pub handle: KernelHandle,
}

impl ResolvedKernel {
    #[must_use]
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    #[must_use]
    pub fn entry(&self) -> KernelFn {
        self.handle.entry()
    }
}

/// Result of scanning both tables for entries without a handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub entries: usize,
    /// Keys whose handle is missing, sorted.
    pub missing: Vec<KernelKey>,
}

impl IntegrityReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty()
    }

    /// `Err(IntegrityFailure)` listing every missing key.
    pub fn into_result(self) -> Result<(), FftError> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(FftError::IntegrityFailure { keys: self.missing })
        }
    }
}

type Table = HashMap<(KernelLength, ComputeScheme), Option<KernelHandle>>;

/// Mutable staging area; [`KernelRegistryBuilder::build`] freezes it.
#[derive(Debug, Clone)]
pub struct KernelRegistryBuilder {
    single: Table,
    double: Table,
    radices: Vec<usize>,
}

impl Default for KernelRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelRegistryBuilder {
    /// Empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            single: Table::new(),
            double: Table::new(),
            radices: DEFAULT_RADICES.to_vec(),
        }
    }

    /// Tables populated from the host kernel catalog.
    #[must_use]
    pub fn from_config(config: &RegistryConfig) -> Self {
        let mut builder = Self::new();
        builder.radices = config.radices.clone();
        kernels::register_catalog(&mut builder, config);
        builder
    }

    fn table_mut(&mut self, precision: Precision) -> &mut Table {
        match precision {
            Precision::Single => &mut self.single,
            Precision::Double => &mut self.double,
        }
    }

    /// Insert or replace; returns true when the key was new.
    pub fn insert(&mut self, key: KernelKey, handle: KernelHandle) -> bool {
        self.table_mut(key.precision)
            .insert((key.length, key.scheme), Some(handle))
            .is_none()
    }

    /// Register `key` without a handle, as a broken build would.
    pub fn insert_missing(&mut self, key: KernelKey) {
        self.table_mut(key.precision)
            .insert((key.length, key.scheme), None);
    }

    /// Returns true when the key was present.
    pub fn remove(&mut self, key: &KernelKey) -> bool {
        self.table_mut(key.precision)
            .remove(&(key.length, key.scheme))
            .is_some()
    }

    #[must_use]
    pub fn with_radices(mut self, radices: Vec<usize>) -> Self {
        self.radices = radices;
        self
    }

    #[must_use]
    pub fn build(self) -> KernelRegistry {
        let registry = KernelRegistry {
            single: self.single,
            double: self.double,
            radices: self.radices,
        };
        record_trace(TraceEvent::RegistryPopulated {
            single_entries: registry.single.len(),
            double_entries: registry.double.len(),
        });
        registry
    }
}

/// Frozen kernel tables.
#[derive(Debug, Clone)]
pub struct KernelRegistry {
    single: Table,
    double: Table,
    radices: Vec<usize>,
}

static GLOBAL_REGISTRY: OnceLock<Arc<KernelRegistry>> = OnceLock::new();
static GLOBAL_POPULATIONS: AtomicUsize = AtomicUsize::new(0);

impl KernelRegistry {
    /// Process-wide registry built from [`RegistryConfig::default`].
    ///
    /// The first caller populates it; concurrent callers block until that
    /// population finishes and then share the same instance.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL_REGISTRY.get_or_init(|| {
            GLOBAL_POPULATIONS.fetch_add(1, Ordering::AcqRel);
            Arc::new(Self::with_config(&RegistryConfig::default()))
        }))
    }

    /// How many times the process-wide tables have been populated (0 or 1).
    #[must_use]
    pub fn global_populations() -> usize {
        GLOBAL_POPULATIONS.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn with_config(config: &RegistryConfig) -> Self {
        KernelRegistryBuilder::from_config(config).build()
    }

    #[must_use]
    pub fn builder() -> KernelRegistryBuilder {
        KernelRegistryBuilder::new()
    }

    /// Copy of these tables for further edits.
    #[must_use]
    pub fn to_builder(&self) -> KernelRegistryBuilder {
        KernelRegistryBuilder {
            single: self.single.clone(),
            double: self.double.clone(),
            radices: self.radices.clone(),
        }
    }

    fn table(&self, precision: Precision) -> &Table {
        match precision {
            Precision::Single => &self.single,
            Precision::Double => &self.double,
        }
    }

    /// Exact-key lookup.
    ///
    /// `NotFound` when the key is absent; `IntegrityFailure` when it is
    /// present without a handle.
    pub fn lookup(&self, key: &KernelKey) -> Result<ResolvedKernel, FftError> {
        match self.table(key.precision).get(&(key.length, key.scheme)) {
            None => Err(FftError::NotFound { key: *key }),
            Some(None) => Err(FftError::IntegrityFailure { keys: vec![*key] }),
            Some(Some(handle)) => Ok(ResolvedKernel {
                key: *key,
                handle: handle.clone(),
            }),
        }
    }

    /// True when `key` has an entry, with or without a handle.
    #[must_use]
    pub fn contains(&self, key: &KernelKey) -> bool {
        self.table(key.precision)
            .contains_key(&(key.length, key.scheme))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.single.len() + self.double.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn radices(&self) -> &[usize] {
        &self.radices
    }

    #[must_use]
    pub fn is_smooth(&self, n: usize) -> bool {
        is_smooth(n, &self.radices)
    }

    /// Lengths with a fused kernel at `precision`, ascending.
    #[must_use]
    pub fn direct_lengths(&self, precision: Precision) -> Vec<usize> {
        let mut lengths: Vec<_> = self
            .table(precision)
            .keys()
            .filter_map(|&(length, scheme)| match (length, scheme) {
                (KernelLength::Exact(n), ComputeScheme::KernelStockham) => Some(n),
                _ => None,
            })
            .collect();
        lengths.sort_unstable();
        lengths
    }

    /// Every key in both tables, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<KernelKey> {
        let mut keys: Vec<_> = Precision::ALL
            .into_iter()
            .flat_map(|precision| {
                self.table(precision)
                    .keys()
                    .map(move |&(length, scheme)| KernelKey::new(length, scheme, precision))
            })
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Scan both tables and report every entry without a handle.
    #[must_use]
    pub fn verify_integrity(&self) -> IntegrityReport {
        let mut missing: Vec<_> = Precision::ALL
            .into_iter()
            .flat_map(|precision| {
                self.table(precision)
                    .iter()
                    .filter(|(_, handle)| handle.is_none())
                    .map(move |(&(length, scheme), _)| KernelKey::new(length, scheme, precision))
            })
            .collect();
        missing.sort_unstable();
        record_trace(TraceEvent::IntegrityChecked {
            entries: self.len(),
            violations: missing.iter().map(ToString::to_string).collect(),
        });
        IntegrityReport {
            entries: self.len(),
            missing,
        }
    }
}
