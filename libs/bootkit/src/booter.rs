//! Bootstrap orchestrator.
//!
//! Phase order: **env → options/config → before_execute → units (boot, register) → after_execute**.
//! Everything runs on the caller's task, one step at a time; the first failure
//! aborts the whole bootstrap so no half-wired service store escapes.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;

use bootkit_bootstrap::{
    apply_debug_level, init_logging, load_dotenv, resolve_root_dir,
    BootOptions, ConfigDocument, ConfigError, BOOTER_KEY, DEFAULT_ENV_PREFIX,
};

use crate::context::{BootContext, Booted};
use crate::contracts::InitUnit;
use crate::store::ConfigStore;

type EnvLoader = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;
type Hook = Box<dyn FnOnce(&mut BootContext) -> anyhow::Result<()> + Send>;
type Decoder = Box<dyn FnOnce(&ConfigDocument, &mut ConfigStore) -> Result<(), ConfigError> + Send>;

struct Section {
    key: String,
    decode: Decoder,
}

/// Structured bootstrap errors. Each names the step, unit or key that failed.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("environment loading failed")]
    Env {
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("before_execute hook failed")]
    BeforeExecute {
        #[source]
        source: anyhow::Error,
    },
    #[error("boot failed for unit #{index} '{unit}'")]
    Boot {
        index: usize,
        unit: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("register failed for unit #{index} '{unit}'")]
    Register {
        index: usize,
        unit: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("after_execute hook failed")]
    AfterExecute {
        #[source]
        source: anyhow::Error,
    },
}

/// Runs initialization units, in the order they were added, between a pre-hook
/// and a post-hook, after loading the environment and configuration.
pub struct Booter {
    env_loader: Option<EnvLoader>,
    options: Option<BootOptions>,
    env_prefix: Option<String>,
    config_optional: bool,
    sections: Vec<Section>,
    units: Vec<Box<dyn InitUnit>>,
    before: Option<Hook>,
    after: Option<Hook>,
}

impl Default for Booter {
    fn default() -> Self {
        Self {
            env_loader: None,
            options: None,
            env_prefix: Some(DEFAULT_ENV_PREFIX.to_string()),
            config_optional: false,
            sections: Vec::new(),
            units: Vec::new(),
            before: None,
            after: None,
        }
    }
}

impl Booter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step 1: populate the process environment (opaque to the booter).
    pub fn load_env<F>(mut self, loader: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.env_loader = Some(Box::new(loader));
        self
    }

    /// Step 1 using `.env` from the current directory (or a parent), if any.
    pub fn dotenv(self) -> Self {
        self.load_env(|| load_dotenv(None))
    }

    /// Use these options instead of parsing the process arguments.
    pub fn with_options(mut self, options: BootOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Prefix for environment overrides (`APP__` by default).
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Decode the document from YAML and `${NAME}` expansion only.
    pub fn without_env_overrides(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// Accept a missing configuration file as an empty document.
    ///
    /// Declared sections then decode from their defaults, or fail with
    /// [`ConfigError::MissingSection`]. Unreadable or malformed files stay fatal.
    pub fn optional_config(mut self) -> Self {
        self.config_optional = true;
        self
    }

    /// Decode the whole document into `T` and store it under [`BOOTER_KEY`].
    pub fn booter_config<T>(self) -> Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.config::<T>(BOOTER_KEY)
    }

    /// Decode the section `key` into `T` and store it under `key`.
    pub fn config<T>(mut self, key: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let key = key.into();
        let store_key = key.clone();
        self.sections.push(Section {
            key,
            decode: Box::new(move |doc, store| {
                let value: T = doc.extract(&store_key)?;
                store.register(store_key, Arc::new(value));
                Ok(())
            }),
        });
        self
    }

    /// Append a unit; units run in insertion order.
    pub fn unit<U: InitUnit + 'static>(mut self, unit: U) -> Self {
        self.units.push(Box::new(unit));
        self
    }

    pub fn units<I>(mut self, units: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn InitUnit>>,
    {
        self.units.extend(units);
        self
    }

    pub fn before_execute<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut BootContext) -> anyhow::Result<()> + Send + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    pub fn after_execute<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut BootContext) -> anyhow::Result<()> + Send + 'static,
    {
        self.after = Some(Box::new(hook));
        self
    }

    /// Run the full bootstrap and freeze the stores.
    pub async fn execute(self) -> Result<Booted, BootError> {
        let Booter {
            env_loader,
            options,
            env_prefix,
            config_optional,
            sections,
            units,
            before,
            after,
        } = self;

        // 1. Environment
        if let Some(load) = env_loader {
            load().map_err(|source| BootError::Env { source })?;
        }

        // 2. Options and configuration
        let options = options.unwrap_or_else(BootOptions::from_args);
        let root_dir = resolve_root_dir(&options.root_dir).map_err(ConfigError::from)?;
        let config_path = root_dir.join(&options.config_file_name);

        let (document, loaded) = match ConfigDocument::load(&config_path, env_prefix.as_deref()) {
            Ok(doc) => (doc, true),
            Err(ConfigError::NotFound { .. }) if config_optional => (
                ConfigDocument::from_yaml_str("", &config_path, env_prefix.as_deref())?,
                false,
            ),
            Err(e) => return Err(e.into()),
        };

        if !options.testing {
            let mut logging = document.logging()?;
            if options.debug {
                apply_debug_level(&mut logging);
            }
            init_logging(&logging, &root_dir);
        }

        tracing::info!(
            path = %config_path.display(),
            loaded,
            sections = sections.len(),
            "Phase: config"
        );

        let mut configs = ConfigStore::new();
        for section in sections {
            tracing::debug!(key = %section.key, "Decoding configuration section");
            (section.decode)(&document, &mut configs)?;
        }

        let mut ctx = BootContext::new(options, root_dir, configs);

        // 3. Pre-hook
        if let Some(hook) = before {
            tracing::info!("Phase: before_execute");
            hook(&mut ctx).map_err(|source| BootError::BeforeExecute { source })?;
        }

        // 4. Units, strictly in list order
        tracing::info!(units = units.len(), "Phase: units");
        for (index, mut unit) in units.into_iter().enumerate() {
            let name = unit.name().to_string();

            tracing::debug!(index, unit = %name, "Booting unit");
            unit.boot(&ctx).await.map_err(|source| BootError::Boot {
                index,
                unit: name.clone(),
                source,
            })?;

            tracing::debug!(index, unit = %name, "Registering unit");
            unit.register(&mut ctx)
                .await
                .map_err(|source| BootError::Register {
                    index,
                    unit: name.clone(),
                    source,
                })?;
        }

        // 5. Post-hook
        if let Some(hook) = after {
            tracing::info!("Phase: after_execute");
            hook(&mut ctx).map_err(|source| BootError::AfterExecute { source })?;
        }

        tracing::info!(
            configs = ctx.configs().len(),
            services = ctx.services().len(),
            "Bootstrap complete"
        );
        Ok(ctx.freeze())
    }
}
