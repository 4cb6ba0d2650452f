use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "iss-bonds")]
#[command(about = "Rank MOEX bonds by the profit left until maturity")]
#[command(version = "1.0")]
pub struct Cli {
    /// Board groups to screen (e.g., 7 58 193); all three when omitted
    pub boardgroups: Vec<u32>,
}
