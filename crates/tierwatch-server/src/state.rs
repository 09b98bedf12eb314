use tierwatch_client::AppSource;
use tierwatch_core::config::{ResolverConfig, ServerDirectory};
use tierwatch_core::{MemoryRateLimitStore, MokaCacheBackend, ResolutionService};
use tierwatch_db::{CharacterRepository, Database};

/// The resolution service as the server wires it.
pub type AppResolver =
    ResolutionService<AppSource, CharacterRepository, MokaCacheBackend, MemoryRateLimitStore>;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub db: Database,
    pub resolver: AppResolver,
    pub servers: ServerDirectory,
}

impl AppState {
    pub fn new(
        db: Database,
        source: AppSource,
        servers: ServerDirectory,
        config: ResolverConfig,
    ) -> Self {
        let cache = MokaCacheBackend::new(10_000, config.cache_ttl);
        let resolver = ResolutionService::new(
            source,
            db.character_repo(),
            cache,
            MemoryRateLimitStore::new(),
            config,
        );
        Self {
            db,
            resolver,
            servers,
        }
    }
}
