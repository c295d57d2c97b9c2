use crate::cuckoo::{CuckooConfig, CuckooFilter};
use crate::error::{BirdsNestError, Result};
use crate::extension::ExtensionRegistry;

/// Builds empty filters and restores persisted ones.
#[derive(Debug, Clone)]
pub struct FilterFactory {
    config: CuckooConfig,
    extensions: ExtensionRegistry,
}

impl FilterFactory {
    pub fn new(config: CuckooConfig, extensions: ExtensionRegistry) -> Self {
        Self { config, extensions }
    }

    pub fn config(&self) -> &CuckooConfig {
        &self.config
    }

    /// Same extensions, different filter geometry.
    pub fn with_config(&self, config: CuckooConfig) -> Self {
        Self {
            config,
            extensions: self.extensions.clone(),
        }
    }

    pub fn build(&self) -> Result<CuckooFilter> {
        CuckooFilter::new(
            self.config.clone(),
            self.extensions.build(self.config.key_type)?,
        )
    }

    pub fn restore(&self, bytes: &[u8]) -> Result<CuckooFilter> {
        CuckooFilter::decode(bytes, &self.extensions)
    }
}

/// Fixed ring of filters. Exactly one, at `current_index`, takes writes.
#[derive(Debug)]
pub struct FilterRing {
    filters: Vec<CuckooFilter>,
    current_index: usize,
    factory: FilterFactory,
}

impl FilterRing {
    /// Ring of `slots` empty filters, writing into slot 0.
    pub fn new(slots: usize, factory: FilterFactory) -> Result<Self> {
        if slots == 0 {
            return Err(BirdsNestError::ZeroLength);
        }
        let filters = (0..slots)
            .map(|_| factory.build())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            filters,
            current_index: 0,
            factory,
        })
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn set_current_index(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.current_index = index;
        Ok(())
    }

    pub fn current(&self) -> &CuckooFilter {
        &self.filters[self.current_index]
    }

    pub fn current_mut(&mut self) -> &mut CuckooFilter {
        &mut self.filters[self.current_index]
    }

    pub fn get(&self, index: usize) -> Option<&CuckooFilter> {
        self.filters.get(index)
    }

    pub fn filters(&self) -> &[CuckooFilter] {
        &self.filters
    }

    /// Swaps in a fresh empty filter at `index`, dropping the old contents.
    pub fn reset(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.filters[index] = self.factory.build()?;
        Ok(())
    }

    pub fn replace(&mut self, index: usize, filter: CuckooFilter) -> Result<()> {
        self.check_index(index)?;
        self.filters[index] = filter;
        Ok(())
    }

    pub fn factory(&self) -> &FilterFactory {
        &self.factory
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.filters.len() {
            return Err(BirdsNestError::IndexOutOfBounds {
                index,
                capacity: self.filters.len(),
            });
        }
        Ok(())
    }
}
