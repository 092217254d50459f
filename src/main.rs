use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use facturacion_masiva::orchestrator::LoggingSink;
use facturacion_masiva::utils::logging;
use facturacion_masiva::{App, Config, ConfirmationCode, Period};

const USAGE: &str = "用法:
  facturacion_masiva [emitir] [PERIODO]        批量开票（PERIODO 形如 2024-05）
  facturacion_masiva descargar <ABONADO> <CUF> 下载发票 PDF";

#[derive(Debug, PartialEq)]
enum Command {
    Emit(Option<Period>),
    Download {
        account_id: String,
        code: ConfirmationCode,
    },
}

fn parse_command(args: &[String]) -> Result<Command> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        [] | ["emitir"] => Ok(Command::Emit(None)),
        ["emitir", period] => Ok(Command::Emit(Some(period.parse()?))),
        ["descargar", account_id, code] => {
            let Some(code) = ConfirmationCode::new(*code) else {
                bail!("确认码不能为空\n{}", USAGE);
            };
            Ok(Command::Download {
                account_id: account_id.to_string(),
                code,
            })
        }
        [period] => match period.parse::<Period>() {
            Ok(period) => Ok(Command::Emit(Some(period))),
            Err(_) => bail!("无法识别的参数 {}\n{}", period, USAGE),
        },
        _ => bail!("参数错误\n{}", USAGE),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load().context("加载配置失败")?;

    // 初始化日志
    logging::init(config.verbose_logging);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_command(&args)?;

    // 初始化应用
    let app = App::initialize(config).await?;

    match command {
        Command::Emit(period) => {
            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("⏹️ 收到 Ctrl-C，停止派发新的开票任务");
                    on_ctrl_c.cancel();
                }
            });

            app.run_emission(period, Arc::new(LoggingSink::default()), cancel)
                .await?;
        }
        Command::Download { account_id, code } => {
            let path = app.download_document(&account_id, &code).await?;
            info!("✓ 发票已保存至 {}", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_emit() {
        assert_eq!(parse_command(&args(&[])).unwrap(), Command::Emit(None));
        assert_eq!(parse_command(&args(&["emitir"])).unwrap(), Command::Emit(None));
        assert_eq!(
            parse_command(&args(&["2024-05"])).unwrap(),
            Command::Emit(Some(Period::parse("2024-05").unwrap()))
        );
        assert!(parse_command(&args(&["emitir", "2024-13"])).is_err());
    }

    #[test]
    fn test_parse_download() {
        let command = parse_command(&args(&["descargar", "1042", "ABC123"])).unwrap();
        assert_eq!(
            command,
            Command::Download {
                account_id: "1042".to_string(),
                code: ConfirmationCode::new("ABC123").unwrap(),
            }
        );
        assert!(parse_command(&args(&["descargar", "1042"])).is_err());
        assert!(parse_command(&args(&["descargar", "1042", " "])).is_err());
    }
}
