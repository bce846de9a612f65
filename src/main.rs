use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use libcint::prelude::*;
use rstsr::prelude::*;
use rstsr_iepa::prelude::*;
use rstsr_iepa::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct CliParser {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CliArgs {
    #[clap(short, long = "mol", help = "Path to the json file containing molecular data")]
    mol_file: String,

    #[clap(short, long = "aux", help = "Path to the json file containing auxiliary basis data, or `etb` for an even-tempered one")]
    aux_file: Option<String>,

    #[clap(long = "flags", help = "Path to the json file containing IEPA flags")]
    flags_file: Option<String>,

    #[clap(short, long = "schemes", value_delimiter = ',', help = "IEPA schemes, e.g. MP2,sIEPA,MP2cr")]
    schemes: Vec<String>,

    #[clap(long = "omega", value_delimiter = ',', allow_negative_numbers = true, help = "Screening parameters")]
    omega_list: Vec<f64>,

    #[clap(long = "integral", help = "Integral scheme (conv or ri)")]
    integral_scheme: Option<String>,
}

#[derive(Args, Debug)]
struct CliArgsStandalone {
    #[clap(flatten)]
    args: CliArgs,

    #[clap(long = "mo_coeff", help = "Path to the npy file of molecular orbital coefficients")]
    mo_coeff_file: String,

    #[clap(long = "mo_energy", help = "Path to the npy file of molecular orbital energies")]
    mo_energy_file: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[clap(name = "run", about = "Run a minimal RHF (RI-RHF with auxiliary basis) and then IEPA-family energies")]
    Run(CliArgs),

    #[clap(name = "standalone", about = "Run IEPA-family energies with SCF data provided by user")]
    Standalone(CliArgsStandalone),
}

fn tensor_from_file(fname: &str) -> Result<Tsr> {
    // c-contiguous numpy array, read with the same (row-major) shape
    let device = DeviceTsr::default();
    let bytes = std::fs::read(fname).with_context(|| format!("failed to read {fname}"))?;
    let npy = npyz::NpyFile::new(&bytes[..]).with_context(|| format!("{fname} is not a npy file"))?;
    let shape = npy.shape().iter().map(|x| *x as usize).collect::<Vec<usize>>();
    let data = npy.into_vec().with_context(|| format!("{fname} does not hold f64 data"))?;
    Ok(rt::asarray((data, shape.c(), &device)))
}

fn aux_cint_data(args: &CliArgs, cint_data: &CInt) -> Option<CInt> {
    args.aux_file.as_deref().map(|aux_file| match aux_file {
        "etb" => basis::get_etb_aux(cint_data, basis::ETB_BETA),
        _ => CInt::from_json(aux_file),
    })
}

/// Flags from file (if any), then overridden by command line arguments.
fn iepa_config(args: &CliArgs) -> Result<IEPAConfig> {
    let mut flags = match &args.flags_file {
        Some(fname) => {
            let text = std::fs::read_to_string(fname).with_context(|| format!("failed to read {fname}"))?;
            serde_json::from_str::<IEPAFlags>(&text).with_context(|| format!("invalid IEPA flags in {fname}"))?
        },
        None => IEPAFlags::default(),
    };
    if !args.schemes.is_empty() {
        flags.iepa_schemes = args.schemes.as_slice().into();
    }
    if !args.omega_list.is_empty() {
        flags.omega_list_iepa = args.omega_list.clone();
    }
    if let Some(integral_scheme) = &args.integral_scheme {
        flags.integral_scheme_iepa = Some(integral_scheme.clone());
    }
    Ok(IEPAConfig::try_from(flags)?)
}

fn run_iepa(info: &IEPAInfo, config: IEPAConfig) -> Result<()> {
    let time = std::time::Instant::now();
    let mut riepa = RIEPA::new(info, config);
    let results = match riepa.run() {
        Ok(results) => results,
        Err(IEPAError::NotConverged { completed, .. }) if !completed.is_empty() => {
            tracing::warn!("partial results before failure: {}", serde_json::to_string(&completed)?);
            anyhow::bail!("IEPA pair iterations not converged")
        },
        Err(err) => return Err(err.into()),
    };
    tracing::info!("elapsed time for IEPA: {:.2?}", time.elapsed());

    if riepa.conv_available() && riepa.ri_available() {
        let discrepancy = riepa.check_integral_discrepancy()?;
        tracing::info!(
            "MP2 correlation energy, conventional {:.10}, density-fitted {:.10} (difference {:.3e})",
            discrepancy.e_conv,
            discrepancy.e_ri,
            discrepancy.diff()
        );
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = CliParser::parse();

    match args.command {
        Command::Run(cli_args) => {
            let config = iepa_config(&cli_args)?;
            let cint_data = CInt::from_json(&cli_args.mol_file);
            let aux_cint_data = aux_cint_data(&cli_args, &cint_data);
            let rhf_results = match &aux_cint_data {
                Some(aux_cint_data) => rhf::minimal_ri_rhf(&cint_data, aux_cint_data),
                None => rhf::minimal_rhf(&cint_data),
            };
            let info = IEPAInfo::from_rhf(&rhf_results, cint_data, aux_cint_data);
            run_iepa(&info, config)
        },
        Command::Standalone(CliArgsStandalone { args: cli_args, mo_coeff_file, mo_energy_file }) => {
            let config = iepa_config(&cli_args)?;
            let cint_data = CInt::from_json(&cli_args.mol_file);
            let aux_cint_data = aux_cint_data(&cli_args, &cint_data);
            let mo_coeff = tensor_from_file(&mo_coeff_file)?;
            let mo_energy = tensor_from_file(&mo_energy_file)?;
            let nocc = rhf::get_nocc(&cint_data);
            let mut info = IEPAInfo::new(mo_coeff, mo_energy, nocc);
            info.cint_data = Some(cint_data);
            info.aux_cint_data = aux_cint_data;
            run_iepa(&info, config)
        },
    }
}
