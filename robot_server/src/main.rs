use anyhow::Result;
use log::{error, info, LevelFilter};
use robot_server::hardware::simulated::SimulatedPlatform;
use robot_server::tcp_server::service::{RobotHardware, RobotService};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志记录器，RUST_LOG 可覆盖默认级别
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
    info!("[主程序] 日志系统已成功初始化 (env_logger)，默认级别: Info。");

    let app_config = robot_server::config::init_config();
    info!(
        "[主程序] 应用配置已加载。监听地址: {}:{}",
        app_config.server.host, app_config.server.port
    );

    let platform = SimulatedPlatform::new(&app_config.simulation);
    info!("[主程序] 模拟平台已就绪，场地 {}x{} cm。", app_config.simulation.arena_width_cm, app_config.simulation.arena_height_cm);

    let shutdown = CancellationToken::new();
    let service = RobotService::new(app_config, RobotHardware::simulated(&platform), shutdown.clone());

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("[主程序] 收到 Ctrl-C，正在关闭服务...");
                shutdown.cancel();
            }
            Err(e) => error!("[主程序] 无法监听 Ctrl-C 信号: {}。服务只能通过终止进程停止。", e),
        }
    });

    info!("[主程序] 正在启动机器人 TCP 服务...");
    if let Err(e) = service.start().await {
        error!("[主程序] 致命错误：机器人 TCP 服务运行失败: {:#}", e);
        return Err(e);
    }
    info!("[主程序] 服务已正常退出。");
    Ok(())
}
