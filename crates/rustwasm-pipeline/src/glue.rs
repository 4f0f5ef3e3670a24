//! Glue stub generation
//!
//! The stub is a CommonJS module. It requires the staged binary (which the
//! host's asset handling turns into a URL), fetches it and exports a
//! promise. Depending on [`StubPayload`] the promise resolves to the
//! instantiated module or to the raw bytes.

use std::path::Path;

use minijinja::{Environment, context};
use rustwasm_core::{Result, StubPayload};

const STUB_TEMPLATE: &str = r#"
module.exports = (() => {
  const wasm = require({{ path|tojson }})

  return fetch(wasm)
    .then(r => r.arrayBuffer())
{%- if instantiate %}
    .then(bytes => WebAssembly.instantiate(bytes))
{%- endif %}
})()
"#;

/// Render the stub for a staged binary
///
/// Pure: the same destination and payload always give the same text.
pub fn render_stub(destination: &Path, payload: StubPayload) -> Result<String> {
    let env = Environment::new();
    let stub = env.render_str(
        STUB_TEMPLATE,
        context! {
            path => destination.to_string_lossy(),
            instantiate => payload == StubPayload::Instance,
        },
    )?;
    Ok(stub)
}
