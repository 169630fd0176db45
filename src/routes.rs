use crate::{
    api::{attendance, reconcile},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let per_ms = if requests_per_min == 0 {
            1
        } else {
            60_000 / requests_per_min as u64
        };
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap();
        Governor::new(&cfg)
    }

    cfg.service(
        web::scope(&config.api_prefix)
            .service(
                web::scope("/reconcile")
                    // /reconcile/run
                    .service(
                        web::resource("/run")
                            .wrap(build_limiter(config.rate_reconcile_per_min))
                            .route(web::post().to(reconcile::run_now)),
                    )
                    // /reconcile/backfill
                    .service(
                        web::resource("/backfill")
                            .wrap(build_limiter(config.rate_reconcile_per_min))
                            .route(web::post().to(reconcile::backfill)),
                    )
                    // /reconcile/watermark
                    .service(
                        web::resource("/watermark")
                            .wrap(build_limiter(config.rate_query_per_min))
                            .route(web::get().to(reconcile::watermark)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    // /attendance
                    .service(
                        web::resource("")
                            .wrap(build_limiter(config.rate_query_per_min))
                            .route(web::get().to(attendance::list_records)),
                    ),
            ),
    );
}
