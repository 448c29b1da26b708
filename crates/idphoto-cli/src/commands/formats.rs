//! Formats command - list supported photo standards.

use anyhow::Result;
use clap::Args;
use idphoto_core::{CountryVariation, RuleParameters};

/// Arguments for the formats command.
#[derive(Args, Clone)]
pub struct FormatsArgs {
    /// Print the full rule parameter tables as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the formats command.
pub fn run(args: &FormatsArgs) -> Result<()> {
    let tables: Vec<RuleParameters> = CountryVariation::ALL
        .into_iter()
        .map(RuleParameters::for_variation)
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tables)?);
        return Ok(());
    }

    for params in &tables {
        let [r, g, b] = params.style.background_color;
        let (min_face, max_face) = params.geometry.face_height_ratio;
        println!(
            "{:<8} background {r},{g},{b} (±{}), face height {:.0}-{:.0}%, glasses {}",
            params.variation.name(),
            params.style.background_tolerance,
            min_face * 100.0,
            max_face * 100.0,
            if params.glasses.allowed {
                "allowed"
            } else {
                "not allowed"
            },
        );
    }
    Ok(())
}
