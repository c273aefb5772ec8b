use bankrec_invoice_match::config::SourceKind;
use bankrec_invoice_match::source::{FrappeInvoiceSource, InvoiceSource, PgInvoiceSource};
use bankrec_invoice_match::{api, create_pool, AppConfig, CandidatePlanner, MatchSettings, SearchOrchestrator};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::load()?;
    info!(
        "Starting server: {}:{}, source: {:?}, company: {}",
        config.server.host, config.server.port, config.source.kind, config.matching.company
    );

    // 发票数据源
    let source: Arc<dyn InvoiceSource> = match config.source.kind {
        SourceKind::Postgres => {
            let pool = create_pool(&config.database.url, config.database.max_connections).await?;
            info!("Database pool created");
            Arc::new(PgInvoiceSource::new(pool))
        }
        SourceKind::Frappe => {
            info!("Using Frappe get_list at {}", config.source.frappe_url);
            Arc::new(FrappeInvoiceSource::new(&config.source)?)
        }
    };

    let settings = Arc::new(MatchSettings::in_memory());
    let orchestrator = Arc::new(SearchOrchestrator::new(
        source,
        settings,
        CandidatePlanner::new(config.matching.company.clone()),
    ));

    let app = api::router(orchestrator).layer(ServiceBuilder::new());

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/match/transaction  - 选择流水并搜索发票");
    info!("  POST /api/match/retry        - 重试");
    info!("  POST /api/match/show-all     - 调试: 全部发票");
    info!("  GET  /api/match/result       - 当前结果");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
