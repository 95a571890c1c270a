//! Meter factories, looked up by name when the orchestrator builds its meters.
//!
//! A [`MeterFactory`] is the boundary a meter implementation has to satisfy;
//! the built-in families are registered by [`MeterRegistry::builtin`] and
//! anything else can be added with [`MeterRegistry::register`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::bus::EventBus;
use crate::collector::{FileSystem, ProviderPaths, SystemCollector};
use crate::config::MeterConfig;
use crate::meter::cpu::Cpu;
use crate::meter::disk::Disk;
use crate::meter::host::Host;
use crate::meter::load::Load;
use crate::meter::memory::Memory;
use crate::meter::network::Network;
use crate::meter::process::Process;
use crate::meter::{Family, Meter, MeterCore, MeterError};
use crate::storage::Store;

/// Everything a factory needs to build one meter.
pub struct MeterContext {
    pub host_id: String,
    pub config: MeterConfig,
    /// Log each collect's duration.
    pub debug: bool,
    /// The meter's own store; never shared with another meter.
    pub store: Box<dyn Store>,
    pub bus: EventBus,
}

/// Builds a meter of one kind.
pub trait MeterFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn create(&self, ctx: MeterContext) -> Result<Arc<dyn Meter>, MeterError>;
}

type Build = dyn Fn(MeterContext) -> Result<Arc<dyn Meter>, MeterError> + Send + Sync;

/// A factory backed by a closure.
pub struct FnFactory {
    name: &'static str,
    build: Box<Build>,
}

impl FnFactory {
    pub fn new<B>(name: &'static str, build: B) -> Self
    where
        B: Fn(MeterContext) -> Result<Arc<dyn Meter>, MeterError> + Send + Sync + 'static,
    {
        Self {
            name,
            build: Box::new(build),
        }
    }

    /// Factory for a [`Family`], building a fresh family value per meter.
    pub fn family<T, B>(build: B) -> Self
    where
        T: Family,
        B: Fn(&MeterConfig) -> T + Send + Sync + 'static,
    {
        Self::new(T::NAME, move |ctx| {
            let family = build(&ctx.config);
            Ok(Arc::new(MeterCore::new(ctx, family)) as Arc<dyn Meter>)
        })
    }
}

impl MeterFactory for FnFactory {
    fn name(&self) -> &'static str {
        self.name
    }

    fn create(&self, ctx: MeterContext) -> Result<Arc<dyn Meter>, MeterError> {
        (self.build)(ctx)
    }
}

#[derive(Default)]
pub struct MeterRegistry {
    factories: BTreeMap<&'static str, Box<dyn MeterFactory>>,
}

impl MeterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory, replacing any previous one with the same name.
    pub fn register(&mut self, factory: Box<dyn MeterFactory>) {
        self.factories.insert(factory.name(), factory);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(&self, name: &str, ctx: MeterContext) -> Result<Arc<dyn Meter>, MeterError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| MeterError::UnknownMeter(name.to_string()))?;
        factory.create(ctx)
    }

    /// The seven built-in meters, all reading through `fs`.
    pub fn builtin<F>(fs: F, paths: ProviderPaths) -> Self
    where
        F: FileSystem + Clone + 'static,
    {
        let collector = SystemCollector::new(fs, paths);
        let mut registry = Self::new();

        let c = collector.clone();
        registry.register(Box::new(FnFactory::family(move |_| Cpu::new(c.clone()))));
        let c = collector.clone();
        registry.register(Box::new(FnFactory::family(move |_| Host::new(c.clone()))));
        let c = collector.clone();
        registry.register(Box::new(FnFactory::family(move |_| Disk::new(c.clone()))));
        let c = collector.clone();
        registry.register(Box::new(FnFactory::family(move |_| Memory::new(c.clone()))));
        let c = collector.clone();
        registry.register(Box::new(FnFactory::family(move |_| Network::new(c.clone()))));
        let c = collector.clone();
        registry.register(Box::new(FnFactory::family(move |_| Load::new(c.clone()))));
        registry.register(Box::new(FnFactory::family(move |config: &MeterConfig| {
            Process::new(collector.clone(), config.process_names.clone())
        })));

        registry
    }
}
