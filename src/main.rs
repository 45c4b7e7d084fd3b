use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use geobucket::blob::ImageStore;
use geobucket::config::StoreConfig;
use geobucket::core::Coordinate;
use geobucket::query::{PlaceStore, QueryServer};
use geobucket::storage::ResourceResolver;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "geobucket", version, about = "Geohash-bucketed place store")]
struct Cli {
    /// TOML 配置文件
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 资源根目录（可重复，排在配置文件的 roots 之前）
    #[arg(long = "root", global = true)]
    roots: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 启动 HTTP 查询服务
    Serve {
        #[arg(long, default_value_t = 6060)]
        port: u16,
    },
    /// 半径查询，输出 JSON
    Nearby {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long, default_value_t = 5.0)]
        radius_km: f64,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// 全量列出，按到中心的距离排序
    All {
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lng: Option<f64>,
    },
    /// 导出地点图片（PNG）
    Image {
        #[arg(long)]
        id: String,
        #[arg(long, default_value_t = 512)]
        max: u32,
        #[arg(long, short)]
        out: PathBuf,
    },
    /// 打印存储状态
    Stats,
}

fn load_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    let mut roots = cli.roots.clone();
    roots.append(&mut config.roots);
    config.roots = roots;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let resolver = ResourceResolver::from_dirs(&config.roots);
    info!("Resource roots: {}", resolver.len());

    let store = Arc::new(PlaceStore::open(&resolver, config.clone()));
    let images = Arc::new(ImageStore::open(&resolver, &config).with_stats(store.stats_handle()));
    let cancel = CancellationToken::new();

    match cli.command {
        Command::Serve { port } => {
            info!("Starting geobucket: {} buckets loaded", store.report().index_buckets);
            let server = QueryServer::new(store.clone(), images.clone());
            let handle = tokio::spawn(server.run(port, cancel.clone()));
            info!("geobucket ready. Query via: http://localhost:{}/nearby?lat=35.6586&lng=139.7454", port);

            tokio::signal::ctrl_c().await?;
            info!("Shutting down...");
            cancel.cancel();
            handle.await??;
        }
        Command::Nearby {
            lat,
            lng,
            radius_km,
            limit,
        } => {
            let center = Coordinate::new(lat, lng);
            let places = tokio::task::spawn_blocking(move || {
                store.load_nearby(center, radius_km, limit, &cancel)
            })
            .await?;
            println!("{}", serde_json::to_string_pretty(&places)?);
        }
        Command::All { lat, lng } => {
            let fallback = config.default_location;
            let center = Coordinate::new(lat.unwrap_or(fallback.lat), lng.unwrap_or(fallback.lng));
            let places = tokio::task::spawn_blocking(move || store.load_all(center, &cancel)).await?;
            println!("{}", serde_json::to_string_pretty(&places)?);
        }
        Command::Image { id, max, out } => {
            let thumb = {
                let id = id.clone();
                tokio::task::spawn_blocking(move || images.load_place_image(&id, max)).await?
            };
            match thumb {
                Some(t) => {
                    std::fs::write(&out, &t.png)?;
                    info!("Wrote {}x{} image for {} to {:?}", t.width, t.height, id, out);
                }
                None => anyhow::bail!("no image for place {}", id),
            }
        }
        Command::Stats => {
            println!("{}", store.report());
        }
    }

    Ok(())
}
