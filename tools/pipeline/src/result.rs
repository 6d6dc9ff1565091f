//! 流水线结果.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use epi_zone::analysis::RoiRecord;
use epi_zone::batch::JobReport;
use epi_zone::correlation::CorrelationRecord;
use epi_zone::{ApicalType, Error, RoiId};
use log::info;
use serde_json::{Map, Value};

/// ROI 统计表文件名.
const ROI_TABLE: &str = "roi_records.jsonl";

/// 相关性表文件名.
const CORRELATION_TABLE: &str = "correlation_records.jsonl";

/// 单个 ROI 的成功结果.
type Finished = (RoiRecord, Option<Vec<CorrelationRecord>>);

/// 将一行 `(列名, 值)` 按列顺序编码为单行 JSON 对象.
fn row_to_json(row: Vec<(String, Value)>) -> serde_json::Result<String> {
    let obj: Map<String, Value> = row.into_iter().collect();
    serde_json::to_string(&obj)
}

/// 把若干行写入 JSON Lines 文件.
fn write_rows<I>(path: &Path, rows: I) -> io::Result<usize>
where
    I: IntoIterator<Item = Vec<(String, Value)>>,
{
    let mut w = BufWriter::new(File::create(path)?);
    let mut n = 0;
    for row in rows {
        writeln!(w, "{}", row_to_json(row)?)?;
        n += 1;
    }
    w.flush()?;
    Ok(n)
}

/// 将汇总信息写进 `w` 中.
fn describe_into<W: Write>(r: &PipelineResult, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    #[inline]
    fn f64_to_display(f: Option<f64>) -> String {
        match f {
            Some(f) => format!("{f:.6}"),
            None => "/".to_string(),
        }
    }

    let count = |t: ApicalType| r.finished.iter().filter(|(rec, _)| rec.roi.apical() == t).count();
    let correlated = r.finished.iter().filter(|(_, c)| c.is_some()).count();
    let total_area: f64 = r.finished.iter().map(|(rec, _)| rec.whole.area).sum();
    let avg_area = (!r.finished.is_empty()).then(|| total_area / r.finished.len() as f64);

    writeln!(w, "Pipeline summary:")?;
    writeln!(w, "{S4}Finished ROIs: {}", r.finished.len())?;
    writeln!(w, "{S4}{S4}apical_in: {}", count(ApicalType::ApicalIn))?;
    writeln!(w, "{S4}{S4}apical_out: {}", count(ApicalType::ApicalOut))?;
    writeln!(w, "{S4}ROIs with nuclei correlation: {correlated}")?;
    writeln!(w, "{S4}Average tissue area: {} um", f64_to_display(avg_area))?;
    write!(w, "{S4}Failed ROIs: {}", r.failed.len())?;
    for (roi, e) in r.failed.iter() {
        write!(w, "\n{S4}{S4}{roi}: {e}")?;
    }
    Ok(())
}

/// 流水线最终结果.
pub struct PipelineResult {
    finished: Vec<Finished>,
    failed: Vec<(RoiId, Error)>,
}

impl PipelineResult {
    /// 按成功与失败拆分各 ROI 的作业结果.
    pub fn from_reports(reports: Vec<JobReport<Finished>>) -> Self {
        let mut finished = Vec::with_capacity(reports.len());
        let mut failed = Vec::new();
        for JobReport { roi, outcome } in reports {
            match outcome {
                Ok(v) => finished.push(v),
                Err(e) => failed.push((roi, e)),
            }
        }
        Self { finished, failed }
    }

    /// 分析运行结果.
    pub fn analyze(&self) {
        utils::sep();
        let mut buf = Vec::with_capacity(512);
        match describe_into(self, &mut buf) {
            Ok(()) => println!("{}", String::from_utf8_lossy(&buf)),
            Err(e) => eprintln!("{e}"),
        }
        utils::sep();
    }

    /// 把 ROI 统计表与相关性表写入 `dir`.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> io::Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let n = write_rows(
            &dir.join(ROI_TABLE),
            self.finished.iter().map(|(rec, _)| rec.to_row()),
        )?;
        info!("写入 {n} 行到 {}", dir.join(ROI_TABLE).display());

        let n = write_rows(
            &dir.join(CORRELATION_TABLE),
            self.finished
                .iter()
                .filter_map(|(_, c)| c.as_ref())
                .flatten()
                .map(CorrelationRecord::to_row),
        )?;
        info!("写入 {n} 行到 {}", dir.join(CORRELATION_TABLE).display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_json_keeps_order() {
        let row = vec![
            ("z".to_string(), Value::from("a\"b")),
            ("a".to_string(), Value::Null),
            ("m".to_string(), Value::from(1.5)),
        ];
        assert_eq!(row_to_json(row).unwrap(), r#"{"z":"a\"b","a":null,"m":1.5}"#);
    }

    #[test]
    fn test_empty_result() {
        let r = PipelineResult::from_reports(Vec::new());
        let mut buf = Vec::new();
        describe_into(&r, &mut buf).unwrap();
        let s = String::from_utf8(buf).unwrap();
        assert!(s.contains("Finished ROIs: 0"));
        assert!(s.contains("Average tissue area: /"));

        let dir = std::env::temp_dir().join(format!("epi-zone-pipeline-{}", std::process::id()));
        r.save(&dir).unwrap();
        assert_eq!(std::fs::read_to_string(dir.join(ROI_TABLE)).unwrap(), "");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
