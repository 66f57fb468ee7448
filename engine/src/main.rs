use clap::Parser;
use cpl_common::{read_toml, RunParameters};
use cpl_engine::{with_background, Distances, EngineError, GrowthSolver};
use log::LevelFilter;
use ndarray::Array2;
use ndarray_npy::write_npy;
use std::error::Error;
use std::str::FromStr;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// path to toml describing the cosmology and redshifts
    #[arg(short, long)]
    toml: String,

    /// log level (off, error, warn, info, debug, trace)
    #[arg(short, long)]
    verbosity: Option<String>,

    /// optional .npy output with columns z, E, r, dA, D, f
    #[arg(short, long)]
    output: Option<String>,
}

const COLUMNS: usize = 6;

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp_secs()
        .filter_level(LevelFilter::from_str(
            args.verbosity.as_deref().unwrap_or("off"),
        )?)
        .init();

    let now = Instant::now();
    let run: RunParameters = read_toml(&args.toml)?;
    log::info!("read {} redshifts from {}", run.redshifts.len(), args.toml);

    let (table, rs_drag) = evaluate(&run)?;

    println!("Cosmology\n{:#?}", run.cosmology);
    println!(
        "{:>10} {:>14} {:>14} {:>14} {:>14} {:>14}",
        "z", "E", "r [Mpc]", "dA [Mpc]", "D", "f"
    );
    for row in table.rows() {
        println!(
            "{:>10.4} {:>14.6e} {:>14.6e} {:>14.6e} {:>14.6e} {:>14.6e}",
            row[0], row[1], row[2], row[3], row[4], row[5]
        );
    }
    println!("rs(z_drag = {}) = {rs_drag:.6} Mpc", run.z_drag());

    if let Some(path) = args.output.as_ref() {
        write_npy(path, &table).map_err(|err| EngineError::IOError {
            path: path.clone(),
            msg: err.to_string(),
        })?;
        log::info!("wrote {path}");
    }

    log::info!("finished in {} ms", now.elapsed().as_millis());
    Ok(())
}

/// Rows of z, E, r, dA, D, f and the sound horizon at the drag epoch
fn evaluate(run: &RunParameters) -> Result<(Array2<f64>, f64), EngineError> {
    with_background(&run.cosmology, |bg| {
        let distances = Distances::new(bg);
        let solver = GrowthSolver::new(bg).with_settings(run.growth_settings());
        let (d, f) = solver.growth_factor_and_rate(&run.redshifts)?;

        let mut table = Array2::zeros((run.redshifts.len(), COLUMNS));
        for (i, &z) in run.redshifts.iter().enumerate() {
            table[[i, 0]] = z;
            table[[i, 1]] = bg.e_z(z);
            table[[i, 2]] = distances.comoving_distance(z);
            table[[i, 3]] = distances.angular_diameter_distance(z);
            table[[i, 4]] = d[i];
            table[[i, 5]] = f[i];
        }

        let rs_drag = distances.sound_horizon(run.z_drag(), run.cosmology.omega_b());
        Ok((table, rs_drag))
    })
}
