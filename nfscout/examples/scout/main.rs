use nfscout::{
    mount::MountClient,
    nfs3::{client::NfsClient, FileType3, NfsFh3},
    portmap::{self, PortmapClient, IPPROTO_TCP},
    rpc::{AuthUnix, Credential},
};

use argh::FromArgs;
use std::error::Error;
use std::io::Write;
use std::time::Duration;

#[derive(FromArgs)]
/// Probe and browse NFS exports
struct Command {
    /// host name or IP address
    #[argh(option, short = 'h')]
    host: String,

    /// portmapper port, default is 111
    #[argh(option, short = 'p', default = "portmap::PORT")]
    port: u16,

    /// receive timeout in seconds
    #[argh(option, short = 't', default = "15")]
    timeout: u64,

    /// uid for AUTH_UNIX credentials
    #[argh(option, short = 'u', default = "0")]
    uid: u32,

    /// gid for AUTH_UNIX credentials
    #[argh(option, short = 'g', default = "0")]
    gid: u32,

    /// machine name sent in AUTH_UNIX credentials
    #[argh(option, default = "String::from(\"nfsclient\")")]
    hostname: String,

    #[argh(subcommand)]
    cmd: Commands,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum Commands {
    Scan(Scan),
    ShowMount(ShowMount),
    Ls(Ls),
    Get(Get),
}

/// List every RPC service registered on the host
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "scan")]
struct Scan {}

/// Print the export table
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "showmount")]
struct ShowMount {}

/// List a directory inside an export
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "ls")]
struct Ls {
    /// absolute path: the export, optionally extended into it
    #[argh(positional)]
    path: String,
}

/// Print a file's contents to stdout
#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "get")]
struct Get {
    /// absolute path to the file
    #[argh(positional)]
    path: String,
}

const READ_CHUNK: u32 = 32768;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cmd: Command = argh::from_env();

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(run(cmd))
}

async fn run(cmd: Command) -> Result<(), Box<dyn Error>> {
    let timeout = Duration::from_secs(cmd.timeout);
    let cred = Credential::Unix(AuthUnix::new(&cmd.hostname, cmd.uid, cmd.gid));

    let mut pmap = PortmapClient::connect(&cmd.host, cmd.port, timeout).await?;

    match &cmd.cmd {
        Commands::Scan(_) => {
            for mapping in pmap.dump().await? {
                println!(
                    "{:>9}  v{}  {:>5}/{}",
                    mapping.prog,
                    mapping.vers,
                    mapping.port,
                    mapping.protocol()
                );
            }
        }

        Commands::ShowMount(_) => {
            let mut mount = connect_mount(&cmd, &mut pmap, timeout).await?;
            for export in mount.export().await? {
                println!("{} -> {}", export.path, export.groups.join(", "));
            }
            mount.disconnect().await?;
        }

        Commands::Ls(args) => {
            let (mut nfs, dir) = open_path(&cmd, &mut pmap, &args.path, &cred, timeout).await?;
            for entry in nfs.read_dir(&dir, &cred).await? {
                let marker = match entry.attributes.as_ref().map(|a| a.file_type) {
                    Some(FileType3::Dir) => 'd',
                    Some(FileType3::Lnk) => 'l',
                    Some(FileType3::Reg) | None => '-',
                    Some(FileType3::Other(_)) => '?',
                };
                let size = entry.attributes.as_ref().map(|a| a.size).unwrap_or(0);
                println!("{} {:>12}  {}", marker, size, entry.name);
            }
            nfs.disconnect().await?;
        }

        Commands::Get(args) => {
            let (file, dir) = match args.path.rsplit_once('/') {
                Some((dir, file)) => (file, dir),
                None => return Err("path must be absolute".into()),
            };
            let (mut nfs, dir_handle) = open_path(&cmd, &mut pmap, dir, &cred, timeout).await?;
            let handle = nfs.lookup(&dir_handle, file, &cred).await?.handle;
            let data = nfs.read_to_end(&handle, 0, READ_CHUNK, &cred).await?;
            std::io::stdout().write_all(&data)?;
            nfs.disconnect().await?;
        }
    }

    pmap.disconnect().await?;
    Ok(())
}

async fn connect_mount(
    cmd: &Command,
    pmap: &mut PortmapClient,
    timeout: Duration,
) -> Result<MountClient, Box<dyn Error>> {
    let port = pmap
        .getport(nfscout::mount::PROGRAM, nfscout::mount::VERSION, IPPROTO_TCP)
        .await?;
    if port == 0 {
        return Err("mount service is not registered".into());
    }
    Ok(MountClient::connect(&cmd.host, port as u16, timeout).await?)
}

/// Mounts the export that prefixes `path` and walks the remaining
/// components, returning the NFS client and the handle of the final one.
async fn open_path(
    cmd: &Command,
    pmap: &mut PortmapClient,
    path: &str,
    cred: &Credential,
    timeout: Duration,
) -> Result<(NfsClient, NfsFh3), Box<dyn Error>> {
    let mut mount = connect_mount(cmd, pmap, timeout).await?;
    let exports = mount.export().await?;
    let export = exports
        .iter()
        .find(|e| path.starts_with(&e.path))
        .ok_or("no export matches the requested path")?;

    let mount_point = mount.mnt(&export.path, cred).await?;
    mount.disconnect().await?;

    let nfs_port = pmap
        .getport(nfscout::nfs3::PROG_NFS, nfscout::nfs3::VERSION, IPPROTO_TCP)
        .await?;
    if nfs_port == 0 {
        return Err("nfs service is not registered".into());
    }
    let mut nfs = NfsClient::connect(&cmd.host, nfs_port as u16, timeout).await?;

    let mut handle = mount_point.handle;
    for part in path[export.path.len()..].split('/') {
        if part.is_empty() {
            continue;
        }
        handle = nfs.lookup(&handle, part, cred).await?.handle;
    }

    Ok((nfs, handle))
}
