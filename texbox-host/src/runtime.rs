//! Guest runtime using wasmtime
//!
//! Compiles the engine module once and instantiates it per session against
//! a fresh fixed-size memory seeded with the initial memory image.

use crate::config::HostConfig;
use crate::error::TypesetError;
use crate::imports;
use crate::resource::EngineAssets;
use crate::session::Session;
use std::sync::Arc;
use wasmtime::*;

/// Typed guest exports the host drives
#[derive(Clone)]
pub(crate) struct EntryPoints {
    pub main: TypedFunc<(), ()>,
    pub start_unwind: TypedFunc<i32, ()>,
    pub stop_unwind: TypedFunc<(), ()>,
    pub start_rewind: TypedFunc<i32, ()>,
    pub stop_rewind: TypedFunc<(), ()>,
}

impl EntryPoints {
    fn resolve(instance: &Instance, store: &mut Store<Session>) -> Result<Self, TypesetError> {
        Ok(Self {
            main: instance
                .get_typed_func::<(), ()>(&mut *store, "main")
                .map_err(|_| TypesetError::MissingExport("main"))?,
            start_unwind: instance
                .get_typed_func::<i32, ()>(&mut *store, "asyncify_start_unwind")
                .map_err(|_| TypesetError::MissingExport("asyncify_start_unwind"))?,
            stop_unwind: instance
                .get_typed_func::<(), ()>(&mut *store, "asyncify_stop_unwind")
                .map_err(|_| TypesetError::MissingExport("asyncify_stop_unwind"))?,
            start_rewind: instance
                .get_typed_func::<i32, ()>(&mut *store, "asyncify_start_rewind")
                .map_err(|_| TypesetError::MissingExport("asyncify_start_rewind"))?,
            stop_rewind: instance
                .get_typed_func::<(), ()>(&mut *store, "asyncify_stop_rewind")
                .map_err(|_| TypesetError::MissingExport("asyncify_stop_rewind"))?,
        })
    }
}

/// Compiled engine shared by every session of a process
pub struct GuestRuntime {
    engine: Engine,
    module: Module,
    linker: Linker<Session>,
    image: Arc<[u8]>,
    config: HostConfig,
}

impl GuestRuntime {
    /// Compile the engine module and register the host imports
    pub fn new(assets: &EngineAssets, config: HostConfig) -> Result<Self, TypesetError> {
        config.validate()?;

        let mut engine_config = Config::new();
        engine_config.consume_fuel(config.fuel_limit.is_some());
        engine_config.max_wasm_stack(config.max_stack_size);
        engine_config.wasm_memory64(false);

        let engine = Engine::new(&engine_config).map_err(TypesetError::EngineCreation)?;
        let module =
            Module::new(&engine, &assets.wasm).map_err(TypesetError::ModuleCompilation)?;

        let mut linker = Linker::new(&engine);
        imports::add_to_linker(&mut linker).map_err(TypesetError::Instantiation)?;

        tracing::info!(
            wasm_bytes = assets.wasm.len(),
            image_bytes = assets.image.len(),
            memory_pages = config.memory_pages,
            "Compiled engine module"
        );

        Ok(Self {
            engine,
            module,
            linker,
            image: Arc::clone(&assets.image),
            config,
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Instantiate the guest for `session`
    ///
    /// Memory is created at its fixed size, the image is copied into its
    /// prefix, and the memory is provided to the guest as `env.memory`.
    pub(crate) fn instantiate(&self, session: Session) -> Result<Store<Session>, TypesetError> {
        let mut store = Store::new(&self.engine, session);
        if let Some(fuel) = self.config.fuel_limit {
            store.set_fuel(fuel).map_err(TypesetError::EngineCreation)?;
        }

        let pages = self.config.memory_pages;
        let memory = Memory::new(&mut store, MemoryType::new(pages, Some(pages)))
            .map_err(TypesetError::Instantiation)?;

        let data = memory.data_mut(&mut store);
        let seeded = self.image.len().min(data.len());
        if seeded < self.image.len() {
            tracing::warn!(
                image_bytes = self.image.len(),
                memory_bytes = data.len(),
                "Memory image larger than guest memory, truncating"
            );
        }
        data[..seeded].copy_from_slice(&self.image[..seeded]);

        let mut linker = self.linker.clone();
        linker
            .define(&store, "env", "memory", memory)
            .map_err(TypesetError::Instantiation)?;

        let instance = linker
            .instantiate(&mut store, &self.module)
            .map_err(TypesetError::Instantiation)?;

        let entry = EntryPoints::resolve(&instance, &mut store)?;
        store.data_mut().attach(memory, entry);

        Ok(store)
    }
}

/// Whether a guest failure was the fuel limit running out
pub(crate) fn is_out_of_fuel(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<Trap>()
        .is_some_and(|trap| *trap == Trap::OutOfFuel)
}
