//! Lists the systems `wl sync` can talk to.

use std::io::Write;

use anyhow::Result;
use wl_client::{SourceKind, TargetKind};

pub fn run<W: Write>(writer: &mut W) -> Result<()> {
    writeln!(writer, "Sources:")?;
    for kind in SourceKind::ALL {
        writeln!(writer, "- {kind}")?;
    }
    writeln!(writer, "Targets:")?;
    for kind in TargetKind::ALL {
        writeln!(writer, "- {kind}")?;
    }
    Ok(())
}
