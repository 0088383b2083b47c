//! Agent Notifier CLI
//!
//! 接收 AI 编码会话的生命周期事件，转发到推送 / 机器人 / webhook 服务

use agent_notifier::{
    EventCategory, HostEvent, HostEventKind, HostIntegration, MessageFormatter, NotificationBuilder,
    NotificationPayload, NotifierConfig,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "agent-notify")]
#[command(about = "Relay AI coding session events to notification services")]
#[command(version)]
struct Cli {
    /// 额外的配置文件（覆盖全局和项目配置）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 从 stdin 持续读取事件（每行一条 JSON），EOF 或 Ctrl-C 时发送挂起通知后退出
    Listen,
    /// 处理一条 hook 事件（stdin 为事件 JSON，可为空）
    Hook {
        /// 事件类型，如 session.idle / permission.request
        #[arg(long)]
        event: Option<String>,
    },
    /// 手动发送一条通知
    Send {
        /// 类别：task-complete / subtask-complete / error / permission-request / clarification-request
        #[arg(long)]
        category: String,
        /// 标题（默认按类别生成）
        #[arg(long)]
        title: Option<String>,
        /// 正文
        #[arg(long, default_value = "")]
        body: String,
        /// 项目名
        #[arg(long)]
        project: Option<String>,
    },
    /// 向所有已启用渠道发送测试通知
    Test,
    /// 打印合并后的配置（密钥打码）
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 日志写 stderr，stdout 留给 host
    // 例如: RUST_LOG=debug agent-notify listen
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("agent_notifier=info,agent_notify=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let config = NotifierConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Listen => {
            let host = build_host(&config)?;
            listen(&host).await?;
        }
        Commands::Hook { event } => {
            let host = build_host(&config)?;
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("Failed to read hook payload from stdin")?;
            let event = parse_hook_event(&input, event.as_deref())?;
            host.handle(&event).await;
            host.shutdown().await;
        }
        Commands::Send {
            category,
            title,
            body,
            project,
        } => {
            let category: EventCategory = category.parse()?;
            let host = build_host(&config)?;
            let title = title.unwrap_or_else(|| MessageFormatter::title(category, project.as_deref()));
            let mut payload = NotificationPayload::new(category, title, body);
            if let Some(project) = project {
                payload = payload.with_project_label(project);
            }
            host.scheduler().submit(payload).await;
            host.shutdown().await;
        }
        Commands::Test => {
            let host = build_host(&config)?;
            let names = host.scheduler().backend_names();
            if names.is_empty() {
                println!("没有启用的通知渠道");
                return Ok(());
            }
            println!("发送测试通知到 {} 个渠道: {}", names.len(), names.join(", "));

            let payload = NotificationPayload::new(
                EventCategory::TaskComplete,
                "[agent-notifier] Test notification",
                "If you can read this, the channel is configured correctly.",
            );
            let reports = host.scheduler().dispatch_now(&payload).await;
            let mut failed = 0;
            for report in &reports {
                match &report.error {
                    None => println!("  ✓ {} ({}ms)", report.backend, report.duration_ms),
                    Some(e) => {
                        failed += 1;
                        println!("  ✗ {} ({}ms): {}", report.backend, report.duration_ms, e);
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{} of {} channels failed", failed, reports.len());
            }
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            let providers = config.enabled_providers();
            if providers.is_empty() {
                eprintln!("没有启用的通知渠道");
            } else {
                eprintln!("已启用渠道: {}", providers.join(", "));
            }
        }
    }

    Ok(())
}

fn build_host(config: &NotifierConfig) -> Result<HostIntegration> {
    let scheduler = NotificationBuilder::new().build(config)?;
    if scheduler.backend_names().is_empty() {
        warn!("No notification channels enabled; events will be dropped");
    }
    Ok(HostIntegration::new(scheduler, config.clone()))
}

/// 读取 stdin 事件流，直到 EOF 或 Ctrl-C
async fn listen(host: &HostIntegration) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Listening for host events on stdin");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<HostEvent>(line) {
                            Ok(event) => {
                                host.handle(&event).await;
                            }
                            Err(e) => warn!(error = %e, "Ignoring malformed host event"),
                        }
                    }
                    None => {
                        debug!("stdin closed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    host.shutdown().await;
    Ok(())
}

/// hook 输入可为空；`--event` 补全或覆盖 `type`
fn parse_hook_event(input: &str, event: Option<&str>) -> Result<HostEvent> {
    let mut value: serde_json::Value = if input.trim().is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_str(input).context("Hook payload is not valid JSON")?
    };

    if let Some(kind) = event {
        let kind: HostEventKind = serde_json::from_value(serde_json::Value::String(kind.to_string()))
            .with_context(|| format!("Unknown event type: {}", kind))?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("type".to_string(), serde_json::to_value(kind)?);
        }
    }

    serde_json::from_value(value).context("Invalid host event")
}
