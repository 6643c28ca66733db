use anyhow::{Context, Result};
use forktrack_report::Summary;

pub fn run(outputs: &[String]) -> Result<()> {
    for output in outputs {
        let text =
            std::fs::read_to_string(output).with_context(|| format!("failed to read {output}"))?;
        let summary =
            Summary::parse(&text).with_context(|| format!("no summary block in {output}"))?;
        println!("{}", summary.compact());
    }
    Ok(())
}
