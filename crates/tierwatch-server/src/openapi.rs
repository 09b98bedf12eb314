use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "tierwatch API",
        version = "0.3.0",
        description = "Character lookups with power index, tier rank and ranking snapshots."
    ),
    paths(
        crate::routes::get_character,
        crate::routes::get_history,
        crate::routes::get_ranking,
        crate::routes::list_servers,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::CharacterResponse,
        crate::dto::ScoreResponse,
        crate::dto::HistoryResponse,
        crate::dto::StatSnapshotResponse,
        crate::dto::RankingResponse,
        crate::dto::RankingEntryResponse,
        crate::dto::ServerListResponse,
        crate::dto::ServerResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "characters", description = "Character resolution and stat history"),
        (name = "rankings", description = "Precomputed ranking snapshots"),
        (name = "system", description = "Servers and health"),
    )
)]
pub struct ApiDoc;
