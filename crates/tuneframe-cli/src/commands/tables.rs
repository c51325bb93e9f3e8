use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use tuneframe_core::sequence::{resolve_sequence, SequenceRequest};

use super::{load_tables, CameraArg};

#[derive(Args)]
pub struct TablesArgs {
    /// Directory with replacement table files
    #[arg(long)]
    pub tables: Option<PathBuf>,

    /// Resolve this sequence id into its channel layout
    #[arg(long)]
    pub sequence: Option<i32>,

    /// Camera the layout is resolved for
    #[arg(long, value_enum, default_value = "side")]
    pub camera: CameraArg,

    /// Wavelength tuning table id of the reference frame
    #[arg(long, default_value = "23")]
    pub hwltid: i32,

    /// Polarization tuning table id of the reference frame
    #[arg(long, default_value = "20")]
    pub hpltid: i32,

    /// Reference wavelength index
    #[arg(long, default_value = "3")]
    pub reference: usize,
}

pub fn run(args: &TablesArgs) -> Result<()> {
    let tables = load_tables(args.tables.as_deref())?;

    let Some(sequence_id) = args.sequence else {
        println!("{:>7}  {:<24}{:>7}{:>9}{:>9}{:>9}{:>9}", "id", "name", "rows", "cad F", "cad S", "chan F", "chan S");
        for s in tables.sequences() {
            println!(
                "{:>7}  {:<24}{:>7}{:>9.1}{:>9.1}{:>9}{:>9}",
                s.id,
                s.name,
                s.len(),
                s.front.cadence,
                s.side.cadence,
                s.front.channels,
                s.side.channels
            );
        }
        println!();
        println!("Geometries:  {}", tables.geometries().count());
        return Ok(());
    };

    let request = SequenceRequest {
        sequence_id,
        wavelength_table_id: args.hwltid,
        polarization_table_id: args.hpltid,
        reference_wavelength: args.reference,
        camera: args.camera.into(),
    };
    let layout = match resolve_sequence(tables, &request) {
        Ok(layout) => layout,
        Err(reason) => bail!("Cannot resolve sequence {sequence_id}: {reason}"),
    };

    println!("Sequence:    {}", layout.sequence_id);
    println!("Camera:      {}", layout.camera);
    println!("Cadence:     {:.1} s", layout.cadence);
    println!("Channels:    {}", layout.channel_count);
    println!("Wavelengths: {}", layout.wavelength_count);
    println!("Npol:        {}", layout.npol);
    println!("Pol type:    {}", layout.polarization_type);
    println!("Combined:    {}", if layout.combine_cameras { "yes" } else { "no" });
    println!();
    println!("{:>4}{:>6}{:>8}{:>10}  {:<22}{:<16}", "loc", "wl", "camera", "fid", "wavelength pos", "pol pos");
    for e in &layout.entries {
        println!(
            "{:>4}{:>6}{:>8}{:>10}  {:<22}{:<16}",
            e.location,
            e.wavelength,
            e.camera.to_string(),
            e.identifier,
            format!("{:?}", e.tuning.wavelength),
            format!("{:?}", e.tuning.polarization)
        );
    }
    Ok(())
}
