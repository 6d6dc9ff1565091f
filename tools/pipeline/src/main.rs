//! 对存储中的所有 ROI 依次执行分割, 区带生成, 统计与相关性分析.
//!
//! 存储位置, 配置文件和人工掩膜目录分别由 `$EPI_ZONE_STORE`, `$EPI_ZONE_CONFIG`
//! 与 `$EPI_ZONE_MANUAL_DIR` 指定. 结果表写入 `$EPI_ZONE_OUTPUT` (默认为当前目录).

use log::{error, LevelFilter};
use simple_logger::SimpleLogger;

mod result;
mod runner;

fn main() {
    if let Err(e) = SimpleLogger::new().with_level(LevelFilter::Info).env().init() {
        eprintln!("Logger initialization error: {e}");
    }

    match runner::run() {
        Ok(result) => {
            result.analyze();
            if let Err(e) = result.save(runner::output_dir()) {
                error!("保存结果表失败: {e}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}
