//! BLADE 命令行入口
//!
//! 启动传输服务器、打印配对地址，并在终端上显示传输进度。

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use blade_core::{AuthSettings, ServerSettings, TransferServer, UserEntry};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blade", version, about = "BLADE - 局域网浏览器文件互传")]
struct Cli {
    /// 详细日志
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 日志写入文件而不是终端
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动服务器，Ctrl-C 停止
    Serve(ServeArgs),
    /// 查看当前生效的设置
    Config {
        /// 将设置写回配置文件
        #[arg(long)]
        save: bool,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Web 界面端口 (默认 80)
    #[arg(long)]
    http_port: Option<u16>,

    /// 原始 socket 通道端口 (默认 8080)
    #[arg(long)]
    port: Option<u16>,

    /// 静态文件目录
    #[arg(long)]
    web_root: Option<PathBuf>,

    /// 上传文件保存目录 (默认: ~/Downloads/BLADE)
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// 启用共享密码认证
    #[arg(long, conflicts_with = "user")]
    password: Option<String>,

    /// 启用用户名/密码认证，格式 NAME:PASS，可重复
    #[arg(long, value_name = "NAME:PASS")]
    user: Vec<String>,

    /// 设备连上后发送的文件，可重复
    #[arg(long)]
    send: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_ref())?;

    match cli.command {
        Commands::Serve(args) => serve(args, cli.verbose).await,
        Commands::Config { save } => show_config(save),
    }
}

/// 桥接 log crate（blade-core 使用）到 tracing
fn init_logging(verbose: bool, log_file: Option<&PathBuf>) -> Result<()> {
    let _ = tracing_log::LogTracer::init();

    let default_filter = if verbose {
        "info,blade_core=debug,blade=debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        }
    }
    Ok(())
}

fn apply_args(settings: &mut ServerSettings, args: &ServeArgs, verbose: bool) -> Result<()> {
    if let Some(port) = args.http_port {
        settings.http_port = port;
    }
    if let Some(port) = args.port {
        settings.transfer_port = port;
    }
    if let Some(root) = &args.web_root {
        settings.web_root = root.clone();
    }
    if let Some(dir) = &args.download_dir {
        settings.download_dir = Some(dir.clone());
    }
    if settings.download_dir.is_none() {
        settings.download_dir = dirs::download_dir().map(|d| d.join("BLADE"));
    }
    settings.verbose |= verbose;

    if let Some(password) = &args.password {
        settings.auth = AuthSettings::Password {
            password: password.clone(),
        };
    } else if !args.user.is_empty() {
        let mut users = Vec::new();
        for spec in &args.user {
            let Some((username, password)) = spec.split_once(':') else {
                bail!("invalid --user value {spec:?}, expected NAME:PASS");
            };
            users.push(UserEntry {
                username: username.to_string(),
                password: password.to_string(),
            });
        }
        settings.auth = AuthSettings::Users { users };
    }
    Ok(())
}

async fn serve(args: ServeArgs, verbose: bool) -> Result<()> {
    let mut settings = ServerSettings::load();
    apply_args(&mut settings, &args, verbose)?;

    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "BLADE".to_string());

    let server = Arc::new(TransferServer::new(settings));
    register_progress(&server);
    server
        .start()
        .context("failed to start the transfer server")?;

    println!("📡 BLADE on {}", host);
    if let Some(url) = server.pairing_url() {
        println!("   在手机浏览器中打开: {}", url);
    }
    if let Some(dir) = server.download_directory() {
        println!("   接收文件保存到: {}", dir.display());
    }

    if !args.send.is_empty() {
        let sender = Arc::clone(&server);
        let files = args.send.clone();
        tokio::spawn(async move { send_when_paired(sender, files).await });
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    println!("⏹️  正在停止...");
    server.stop().await;
    if !server.drain(Duration::from_secs(5)).await {
        tracing::warn!("Some connections were still active at shutdown");
    }
    Ok(())
}

fn register_progress(server: &TransferServer) {
    server.on_outgoing_progress(|path, pct| {
        tracing::debug!("outgoing {}: {}%", path, pct);
        match pct {
            0 => println!("📤 等待下载: {}", path),
            100 => println!("✅ 已发送: {}", path),
            _ => {}
        }
    });
    server.on_incoming_progress(|name, pct| {
        tracing::debug!("incoming {}: {}%", name, pct);
        if pct == 100 {
            println!("📥 已接收: {}", name);
        }
    });
    server.on_incoming_file_announced(|name, size| {
        println!("📨 即将接收: {} ({} bytes)", name, size);
    });
}

/// 等待第一个设备连上后排队发送
async fn send_when_paired(server: Arc<TransferServer>, files: Vec<PathBuf>) {
    println!("   等待设备连接后发送 {} 个文件...", files.len());
    while server.is_running() && !server.has_connected_clients() {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    if !server.is_running() {
        return;
    }
    match server.enqueue_downloads(files) {
        Ok(count) => println!("   已排队 {} 个文件", count),
        Err(e) => tracing::warn!("Failed to queue files: {}", e),
    }
}

fn show_config(save: bool) -> Result<()> {
    let path = ServerSettings::config_path();
    let settings = ServerSettings::load();
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(&settings)?);
    if save {
        settings.save()?;
        println!("# saved");
    }
    Ok(())
}
