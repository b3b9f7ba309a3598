use crate::{
    arena::Handle, change::ComputedProperty, config::CollectionConfig, query::Query,
    record::Record,
};
use std::{fmt, sync::Arc};

/// Replacement for the whole query pipeline of one collection.
pub type FilterFn = Arc<
    dyn for<'a> Fn(Vec<(Handle, &'a Record)>, &Query) -> Vec<(Handle, &'a Record)> + Send + Sync,
>;

///
/// CollectionDef
///
/// Everything needed to define a collection: its plain-data config plus the
/// behavioural hooks that cannot be expressed as data.
///

#[derive(Clone)]
pub struct CollectionDef {
    pub name: String,
    pub config: CollectionConfig,
    pub computed: Vec<ComputedProperty>,
    pub filter: Option<FilterFn>,
}

impl CollectionDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: CollectionConfig::default(),
            computed: Vec::new(),
            filter: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: CollectionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_computed(mut self, computed: ComputedProperty) -> Self {
        self.computed.push(computed);
        self
    }

    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: for<'a> Fn(Vec<(Handle, &'a Record)>, &Query) -> Vec<(Handle, &'a Record)>
            + Send
            + Sync
            + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
}

impl fmt::Debug for CollectionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionDef")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("computed", &self.computed)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}
