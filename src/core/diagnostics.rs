/*!

   Diagnostics setup shared by the command-line tools: installs the
   `color_eyre` panic/report handlers and a `tracing` subscriber driven by
   `RUST_LOG`.

*/

use color_eyre::Report;
use tracing_subscriber::EnvFilter;

pub fn diagnostics_setup() -> Result<(), Report> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
    Ok(())
}

pub fn diagnostics_color_disable() {
    yansi::Paint::disable();
}
