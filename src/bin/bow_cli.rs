use bow_engine::{
    draw_force_curve, stored_energy, uniform_draws, BowModel, IntegrationOptions,
    SampledProfile, SolverSettings,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::error::Error;

#[derive(Parser)]
#[command(name = "bow")]
#[command(version = "0.1.0")]
#[command(about = "Static bow limb deformation calculator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve static equilibrium at a single draw length
    Equilibrium {
        /// Limb arc length
        #[arg(short = 'L', long, default_value = "0.8")]
        limb_length: f64,

        /// Draw length
        #[arg(short = 'b', long)]
        draw: f64,

        /// Half string length (omit to calibrate from the brace height)
        #[arg(short = 'l', long)]
        string_length: Option<f64>,

        /// Brace height to calibrate the string length from
        #[arg(long)]
        brace_height: Option<f64>,

        /// Comma-separated stiffness samples, spaced uniformly over the limb
        #[arg(short = 'w', long, default_value = "10,5")]
        stiffness: String,

        /// Comma-separated unstressed angle samples, spaced uniformly over the limb
        #[arg(short = 't', long, default_value = "0,0")]
        theta: String,

        /// Output grid intervals along the limb
        #[arg(long, default_value = "50")]
        steps: usize,

        /// Assume the string loads the whole limb (skip contact detection)
        #[arg(long)]
        full_contact: bool,

        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        output: OutputFormat,

        /// Include the full shape table
        #[arg(long)]
        full: bool,
    },

    /// Sweep draw lengths and print the force-draw curve
    DrawCurve {
        /// Limb arc length
        #[arg(short = 'L', long, default_value = "0.8")]
        limb_length: f64,

        /// Half string length (omit to calibrate from the brace height)
        #[arg(short = 'l', long)]
        string_length: Option<f64>,

        /// Brace height to calibrate the string length from
        #[arg(long)]
        brace_height: Option<f64>,

        /// Comma-separated stiffness samples, spaced uniformly over the limb
        #[arg(short = 'w', long, default_value = "10,5")]
        stiffness: String,

        /// Comma-separated unstressed angle samples, spaced uniformly over the limb
        #[arg(short = 't', long, default_value = "0,0")]
        theta: String,

        /// First draw length of the sweep
        #[arg(long, default_value = "0.3")]
        start: f64,

        /// Last draw length of the sweep
        #[arg(long, default_value = "0.6")]
        end: f64,

        /// Number of draw lengths
        #[arg(short = 'n', long, default_value = "7")]
        count: usize,

        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        output: OutputFormat,
    },

    /// Display model information
    Info,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Serialize)]
struct ShapePoint {
    s: f64,
    x: f64,
    y: f64,
    phi: f64,
}

#[derive(Debug, Serialize)]
struct EquilibriumReport {
    limb_length: f64,
    string_half_length: f64,
    draw: f64,
    force: f64,
    string_angle_rad: f64,
    draw_force: f64,
    contact_s: f64,
    contact_x: f64,
    contact_y: f64,
    iterations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    shape: Option<Vec<ShapePoint>>,
}

#[derive(Debug, Serialize)]
struct CurveRow {
    draw: f64,
    force: f64,
    string_angle_rad: f64,
    draw_force: f64,
    energy: f64,
}

fn parse_samples(list: &str) -> Result<Vec<f64>, Box<dyn Error>> {
    let values = list
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|e| format!("invalid profile sample list '{list}': {e}"))?;
    if values.len() < 2 {
        return Err(format!("profile '{list}' needs at least two samples").into());
    }
    Ok(values)
}

#[allow(clippy::too_many_arguments)]
fn build_model(
    limb_length: f64,
    string_length: Option<f64>,
    brace_height: Option<f64>,
    stiffness: &str,
    theta: &str,
    steps: usize,
    full_contact: bool,
) -> Result<BowModel, Box<dyn Error>> {
    let stiffness = SampledProfile::from_uniform(limb_length, parse_samples(stiffness)?);
    let theta0 = SampledProfile::from_uniform(limb_length, parse_samples(theta)?);

    let settings = SolverSettings {
        integration: IntegrationOptions {
            output_steps: steps,
            full_contact,
            ..Default::default()
        },
        ..Default::default()
    };

    match (string_length, brace_height) {
        (Some(length), None) => Ok(BowModel::with_string_length(
            theta0,
            stiffness,
            limb_length,
            length,
            settings,
        )),
        (None, Some(brace)) => Ok(BowModel::from_brace_height(
            theta0,
            stiffness,
            limb_length,
            brace,
            settings,
        )?),
        (None, None) => Err("pass either --string-length or --brace-height".into()),
        (Some(_), Some(_)) => {
            Err("--string-length and --brace-height are mutually exclusive".into())
        }
    }
}

fn print_equilibrium_table(report: &EquilibriumReport) {
    println!("BOW EQUILIBRIUM");
    println!("  limb length:        {:.4}", report.limb_length);
    println!("  string half-length: {:.4}", report.string_half_length);
    println!("  draw length:        {:.4}", report.draw);
    println!("  string force:       {:.4}", report.force);
    println!(
        "  string angle:       {:.4} rad ({:.2} deg)",
        report.string_angle_rad,
        report.string_angle_rad.to_degrees()
    );
    println!("  draw force:         {:.4}", report.draw_force);
    println!(
        "  contact point:      s = {:.4} (x = {:.4}, y = {:.4})",
        report.contact_s, report.contact_x, report.contact_y
    );
    println!("  iterations:         {}", report.iterations);

    if let Some(shape) = &report.shape {
        println!();
        println!("  {:>8} {:>10} {:>10} {:>10}", "s", "x", "y", "phi");
        for point in shape {
            println!(
                "  {:>8.4} {:>10.6} {:>10.6} {:>10.6}",
                point.s, point.x, point.y, point.phi
            );
        }
    }
}

fn print_curve_table(rows: &[CurveRow]) {
    println!("FORCE-DRAW CURVE");
    println!(
        "  {:>8} {:>12} {:>12} {:>12} {:>12}",
        "draw", "force", "angle", "draw force", "energy"
    );
    for row in rows {
        println!(
            "  {:>8.4} {:>12.4} {:>12.4} {:>12.4} {:>12.4}",
            row.draw, row.force, row.string_angle_rad, row.draw_force, row.energy
        );
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Equilibrium {
            limb_length,
            draw,
            string_length,
            brace_height,
            stiffness,
            theta,
            steps,
            full_contact,
            output,
            full,
        } => {
            let model = build_model(
                limb_length,
                string_length,
                brace_height,
                &stiffness,
                &theta,
                steps,
                full_contact,
            )?;
            let solution = model.solve_equilibrium(draw)?;

            let shape = full.then(|| {
                solution
                    .shape
                    .s
                    .iter()
                    .zip(&solution.shape.x)
                    .zip(&solution.shape.y)
                    .zip(&solution.shape.phi)
                    .map(|(((&s, &x), &y), &phi)| ShapePoint { s, x, y, phi })
                    .collect()
            });
            let (contact_x, contact_y) = solution.shape.contact_point();
            let report = EquilibriumReport {
                limb_length,
                string_half_length: model.string_half_length(),
                draw,
                force: solution.force,
                string_angle_rad: solution.string_angle,
                draw_force: solution.draw_force(),
                contact_s: solution.shape.contact_s,
                contact_x,
                contact_y,
                iterations: solution.iterations,
                shape,
            };

            match output {
                OutputFormat::Table => print_equilibrium_table(&report),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Csv => {
                    println!("draw,force,string_angle_rad,draw_force,contact_s");
                    println!(
                        "{},{},{},{},{}",
                        report.draw,
                        report.force,
                        report.string_angle_rad,
                        report.draw_force,
                        report.contact_s
                    );
                    if let Some(shape) = &report.shape {
                        println!();
                        println!("s,x,y,phi");
                        for point in shape {
                            println!("{},{},{},{}", point.s, point.x, point.y, point.phi);
                        }
                    }
                }
            }
        }

        Commands::DrawCurve {
            limb_length,
            string_length,
            brace_height,
            stiffness,
            theta,
            start,
            end,
            count,
            output,
        } => {
            let model = build_model(
                limb_length,
                string_length,
                brace_height,
                &stiffness,
                &theta,
                50,
                false,
            )?;
            let curve = draw_force_curve(&model, &uniform_draws(start, end, count))?;
            let energy = stored_energy(&curve);

            let rows: Vec<CurveRow> = curve
                .iter()
                .zip(&energy)
                .map(|(point, &energy)| CurveRow {
                    draw: point.draw,
                    force: point.force,
                    string_angle_rad: point.string_angle,
                    draw_force: point.draw_force,
                    energy,
                })
                .collect();

            match output {
                OutputFormat::Table => print_curve_table(&rows),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
                OutputFormat::Csv => {
                    println!("draw,force,string_angle_rad,draw_force,energy");
                    for row in &rows {
                        println!(
                            "{},{},{},{},{}",
                            row.draw,
                            row.force,
                            row.string_angle_rad,
                            row.draw_force,
                            row.energy
                        );
                    }
                }
            }
        }

        Commands::Info => {
            println!("Bow Engine v{}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Static bow limb deformation, after Kooi & Sparenberg,");
            println!("'On the static deformation of the bow', J. Eng. Math. 14 (1980).");
            println!();
            println!("The limb is described by two profiles over its arc length:");
            println!("  - unstressed angle theta0(s)");
            println!("  - bending stiffness W(s)");
            println!("given as uniformly spaced samples (linear interpolation).");
            println!();
            println!("Commands: equilibrium, draw-curve, info");
        }
    }

    Ok(())
}
