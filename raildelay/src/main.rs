use clap::Parser;
use raildelay::app::EtlApp;
use raildelay::config::EtlConfig;
use raildelay::error::EtlError;

fn main() -> Result<(), EtlError> {
    env_logger::init();
    let args = EtlApp::parse();
    let config = EtlConfig::load()?;
    args.op.run(config)
}
