// Model cache example: a registry in front of a toy model loader.
//
// Shows loading through a `Loader`, sharing handles, checking freshness,
// and sweeping unused models. Run with `RUST_LOG=asset_pool=debug` to see
// the registry's log events.

use std::collections::HashMap;
use std::sync::Arc;

use asset_pool::{LoadResult, Loader, Registry, RegistryConfig};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

// -- Resource ---------------------------------------------------------------

/// A loaded model: its source path and the revision it was read at.
#[derive(Debug)]
struct Model {
    path: String,
    revision: u32,
}

// -- Loader -----------------------------------------------------------------

/// Options a caller can pass through the registry to the loader.
#[derive(Debug, Default)]
struct LoadOptions {
    report_errors: bool,
}

/// Pretends to read models from disk; `revisions` stands in for file mtimes.
struct DiskLoader {
    revisions: Mutex<HashMap<String, u32>>,
}

impl Loader<Model> for DiskLoader {
    type Options = LoadOptions;

    fn load(&self, key: &str, options: &LoadOptions) -> LoadResult<Model> {
        let Some(revision) = self.revisions.lock().get(key).copied() else {
            if options.report_errors {
                tracing::error!(key, "Model not found on disk");
            }
            return Ok(None);
        };
        Ok(Some(Arc::new(Model {
            path: key.to_owned(),
            revision,
        })))
    }

    fn is_valid(&self, key: &str, resource: &Model) -> bool {
        self.revisions.lock().get(key) == Some(&resource.revision)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let registry: Registry<Model> = Registry::with_config(RegistryConfig {
        name: "model pool".into(),
        initial_capacity: 16,
    })?;
    let loader = DiskLoader {
        revisions: Mutex::new(HashMap::from([
            ("teddy.egg".to_owned(), 1),
            ("teapot.egg".to_owned(), 1),
        ])),
    };
    let options = LoadOptions {
        report_errors: true,
    };

    let teddy = registry.load_with("teddy.egg", &loader, &options)?;
    let again = registry.load_with("teddy.egg", &loader, &options)?;
    println!(
        "same instance: {} ({} rev {})",
        Arc::ptr_eq(&teddy, &again),
        teddy.path,
        teddy.revision
    );

    registry.load_with("teapot.egg", &loader, &options)?;
    if let Err(err) = registry.load_with("missing.egg", &loader, &options) {
        println!("load failed: {err}");
    }

    // The teapot changes on disk; the cached copy is now stale.
    loader.revisions.lock().insert("teapot.egg".to_owned(), 2);
    if !registry.verify("teapot.egg", &loader) {
        registry.release("teapot.egg");
        let teapot = registry.load_with("teapot.egg", &loader, &options)?;
        println!("reloaded {} at rev {}", teapot.path, teapot.revision);
    }

    let mut report = String::new();
    registry.write(&mut report)?;
    print!("{report}");

    drop((teddy, again));
    println!("collected {} unused models", registry.garbage_collect());
    print!("{registry}");

    println!("stats: {}", serde_json::to_string(&registry.stats())?);
    Ok(())
}
