use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock},
};

use crate::{
    loader::{
        parse_resource, GraphId, ImageInfo, LoadedGraph, LoaderOptions, MetadataLoader,
        ResourceResolver,
    },
    Result,
};

/// A loader for single-threaded use: one cache map, no locking
pub struct LocalLoader<R: ResourceResolver> {
    resolver: R,
    options: LoaderOptions,
    cache: RefCell<HashMap<String, LoadedGraph>>,
    images: RefCell<BTreeMap<GraphId, Arc<ImageInfo>>>,
}

impl<R: ResourceResolver> LocalLoader<R> {
    /// A loader with an empty cache
    pub fn new(resolver: R, options: LoaderOptions) -> Self {
        LocalLoader {
            resolver,
            options,
            cache: RefCell::new(HashMap::new()),
            images: RefCell::new(BTreeMap::new()),
        }
    }

    /// Number of cached graphs
    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Whether nothing has been loaded yet
    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }
}

impl<R: ResourceResolver> MetadataLoader for LocalLoader<R> {
    fn resolve(&self, resource: &str) -> Result<LoadedGraph> {
        let key = self.resolver.sanitize(resource);
        if let Some(graph) = self.cache.borrow().get(&key) {
            return Ok(graph.clone());
        }

        let stream = self.resolver.open_stream(&key)?;
        let (graph, info) = parse_resource(&key, stream, &self.options)?;

        let id = GraphId(self.cache.borrow().len());
        let loaded = LoadedGraph {
            id,
            resource: key.as_str().into(),
            graph: Arc::new(RwLock::new(graph)),
        };
        self.images.borrow_mut().insert(id, Arc::new(info));
        self.cache.borrow_mut().insert(key, loaded.clone());
        Ok(loaded)
    }

    fn image_info(&self, id: GraphId) -> Option<Arc<ImageInfo>> {
        self.images.borrow().get(&id).cloned()
    }

    fn resolver(&self) -> &dyn ResourceResolver {
        &self.resolver
    }

    fn options(&self) -> &LoaderOptions {
        &self.options
    }
}
