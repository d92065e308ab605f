use clap::{Parser, Subcommand};
use provlink::config::{Config, ConfigLoader};
use provlink::device::DeviceSession;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "provlink",
    version,
    about = "Provision embedded targets over their serial console.",
    long_about = "Talks the half-duplex provisioning protocol of the target firmware: \
                  staged configuration writes with batch commit, on-target key/CSR/\
                  certificate generation, and certificate import with readback \
                  verification."
)]
struct Cli {
    /// Serial port path (overrides the config file).
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate (overrides the config file).
    #[arg(short, long)]
    baud: Option<u32>,

    /// Explicit config file path.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports available on this system.
    ListPorts,
    /// Read or write the target's key/value configuration.
    Conf {
        #[command(subcommand)]
        action: ConfAction,
    },
    /// On-target PKI operations.
    Pki {
        #[command(subcommand)]
        action: PkiAction,
    },
    /// Reboot the target.
    Reset,
}

#[derive(Subcommand, Debug)]
enum ConfAction {
    /// Print one configuration value.
    Get { key: String },
    /// Print the full configuration as JSON.
    GetAll,
    /// Set a key and commit it to the target.
    Set { key: String, value: String },
    /// Commit configuration values pending on the target, e.g. after an
    /// interrupted provisioning run.
    Commit,
}

#[derive(Subcommand, Debug)]
enum PkiAction {
    /// Generate a keypair on the target and print/store the public key.
    GenerateKey {
        /// Key slot label.
        #[arg(long)]
        label: Option<String>,
        /// Write the PEM here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Generate a certificate signing request on the target.
    GenerateCsr {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Generate a self-signed certificate on the target.
    GenerateCert {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Import a PEM certificate into the target.
    ImportCert {
        /// Path to the certificate file.
        file: PathBuf,
        /// Certificate slot label.
        #[arg(long)]
        label: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => ConfigLoader::load_from(path)?.into_config(),
        None => ConfigLoader::load()?.into_config(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::ListPorts => list_ports(),
        command => {
            let mut session = connect(&cli.port, cli.baud, &config)?;
            run(&mut session, command)
        }
    }
}

fn connect(
    port: &Option<String>,
    baud: Option<u32>,
    config: &Config,
) -> Result<DeviceSession, Box<dyn std::error::Error>> {
    let path = port
        .clone()
        .or_else(|| config.serial.port.clone())
        .ok_or("no serial port given; use --port or set serial.port in provlink.toml")?;
    let baud = baud.unwrap_or(config.serial.baud);

    info!("connecting to {} at {} baud", path, baud);
    let port = provlink::port::SyncSerialPort::open(&path, baud)?;
    let session = DeviceSession::open(Box::new(port), config.transport.timeouts())?;
    Ok(session)
}

fn run(
    session: &mut DeviceSession,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::ListPorts => unreachable!("handled before connecting"),
        Command::Conf { action } => match action {
            ConfAction::Get { key } => {
                match session.conf_get(&key) {
                    Some(value) => println!("{value}"),
                    None => return Err(format!("key '{key}' not present on the target").into()),
                }
                Ok(())
            }
            ConfAction::GetAll => {
                let merged = session.conf_get_all();
                println!("{}", serde_json::to_string_pretty(&merged)?);
                Ok(())
            }
            ConfAction::Set { key, value } => {
                session.conf_set(&key, &value);
                session.conf_commit()?;
                info!("committed {}={}", key, value);
                Ok(())
            }
            ConfAction::Commit => {
                session.send_command(&[b"conf", b"commit"])?;
                session.read_response()?;
                info!("configuration committed");
                Ok(())
            }
        },
        Command::Pki { action } => match action {
            PkiAction::GenerateKey { label, out } => {
                let pem = session.generate_key(label.as_deref())?;
                emit_pem(&pem, out.as_deref())
            }
            PkiAction::GenerateCsr { out } => {
                let pem = session.generate_csr()?;
                emit_pem(&pem, out.as_deref())
            }
            PkiAction::GenerateCert { out } => {
                let pem = session.generate_cert()?;
                emit_pem(&pem, out.as_deref())
            }
            PkiAction::ImportCert { file, label } => {
                let cert = std::fs::read(&file)?;
                session.write_cert(&cert, label.as_deref())?;
                info!("certificate imported and verified");
                Ok(())
            }
        },
        Command::Reset => {
            session.reset()?;
            info!("target reset");
            Ok(())
        }
    }
}

fn emit_pem(pem: &[u8], out: Option<&std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
    match out {
        Some(path) => {
            std::fs::write(path, pem)?;
            info!("wrote {} bytes to {}", pem.len(), path.display());
        }
        None => {
            std::io::stdout().write_all(pem)?;
        }
    }
    Ok(())
}

fn list_ports() -> Result<(), Box<dyn std::error::Error>> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("no serial ports found");
        return Ok(());
    }
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(info) => {
                println!(
                    "{}: {} {}",
                    port.port_name,
                    info.manufacturer.as_deref().unwrap_or(""),
                    info.product.as_deref().unwrap_or("")
                );
            }
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_grammar_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn conf_commit_parses_as_a_subcommand() {
        let cli = Cli::try_parse_from(["provlink", "conf", "commit"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Conf {
                action: ConfAction::Commit
            }
        ));
    }
}
