use std::path::Path;

use crate::FlowResult;
use crate::core::Circuit;

/// Human-readable summary of a circuit bundle.
pub fn describe(circuit: &Circuit) -> FlowResult<Vec<String>> {
    let header = circuit.header()?;
    let mut lines = vec![
        format!("sha256:       {}", circuit.fingerprint()),
        format!(
            "noir_version: {}",
            header.noir_version.as_deref().unwrap_or("unknown")
        ),
        format!(
            "hash:         {}",
            header.hash.map(|h| h.to_string()).unwrap_or_else(|| "-".into())
        ),
        format!("bytecode:     {} chars (base64, gzip)", header.bytecode_len()),
        format!("functions:    {}", header.names.join(", ")),
    ];
    if header.abi.parameters.is_empty() {
        lines.push("parameters:   none".into());
    } else {
        lines.push("parameters:".into());
        for p in &header.abi.parameters {
            lines.push(format!(
                "  {}: {} ({})",
                p.name,
                p.typ.kind,
                p.visibility.as_deref().unwrap_or("private")
            ));
        }
    }
    lines.push(format!(
        "returns:      {}",
        if header.abi.return_type.is_some() { "yes" } else { "no" }
    ));
    Ok(lines)
}

pub fn run(circuit: &Path) -> FlowResult<()> {
    let circuit = Circuit::from_file(circuit)?;
    for line in describe(&circuit)? {
        println!("{line}");
    }
    Ok(())
}
