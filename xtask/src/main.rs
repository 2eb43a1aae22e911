//! The pico-mda-rs firmware builder

use std::path::{Path, PathBuf};

/// The only target the firmware builds for
const FIRMWARE_TARGET: &str = "thumbv6m-none-eabi";

/// The firmware's binary name, as set in firmware/Cargo.toml
const FIRMWARE_BIN: &str = "pico-mda";

static HELP_TEXT: &str = r#"
The pico-mda-rs firmware builder version $CARGO_PKG_VERSION.

$CARGO_PKG_LICENSE

Options:

  * "help" - print this help text
  * "build" - compile the firmware into a UF2 file
  * "test" - run the video engine tests on this machine
  * "fmt" - format the code
  * "fmt-check" - check the code is formatted
  * "clippy" - run clippy on the firmware and the host crates
"#;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Entry point to the program
///
/// We don't use anyhow or eyre here to keep the dependencies to a minimum
fn main() -> Result<()> {
    // we need this to exist
    let target_dir = Path::new("target");
    std::fs::create_dir_all(target_dir)?;

    let command = std::env::args().nth(1).unwrap_or("help".to_string());
    match command.as_str() {
        "build" => {
            println!("Building...");
            build(target_dir)?;
        }
        "test" => {
            println!("Running tests...");
            run_cargo(&["test", "--package", "videoout"])?;
        }
        "fmt" => {
            println!("Running fmt...");
            run_cargo(&["fmt", "--all"])?;
        }
        "fmt-check" => {
            println!("Running fmt --check...");
            run_cargo(&["fmt", "--all", "--check"])?;
        }
        "clippy" => {
            println!("Running clippy...");
            get_target(FIRMWARE_TARGET)?;
            run_cargo(&["clippy", "--package", "videoout", "--package", "xtask"])?;
            run_cargo(&[
                "clippy",
                "--package",
                "firmware",
                "--target",
                FIRMWARE_TARGET,
            ])?;
        }
        _ => {
            let help = HELP_TEXT.to_string();
            let help = help.replace("$CARGO_PKG_VERSION", env!("CARGO_PKG_VERSION"));
            let help = help.replace("$CARGO_PKG_LICENSE", env!("CARGO_PKG_LICENSE"));
            println!("{help}");
        }
    }
    Ok(())
}

/// Build the firmware
fn build(target_dir: &Path) -> Result<()> {
    get_package("flip-link")?;
    get_target(FIRMWARE_TARGET)?;
    let picotool = get_picotool(target_dir)?;
    let target_elf = target_dir.join("pico-mda-rs.elf");
    let target_uf2 = target_dir.join("pico-mda-rs.uf2");
    build_firmware(target_dir, &target_elf)?;
    make_uf2(&target_elf, &target_uf2, &picotool)?;
    println!(
        "** Complete! You now have {uf2} **",
        uf2 = target_uf2.display()
    );
    Ok(())
}

/// Install a package
fn get_package(package: &str) -> Result<()> {
    let mut command = std::process::Command::new("cargo");
    command.arg("install");
    command.arg("--locked");
    command.arg(package);
    run_command(command)?;
    Ok(())
}

/// Add our target to rustup
fn get_target(target: &str) -> Result<()> {
    let mut command = std::process::Command::new("rustup");
    command.arg("target");
    command.arg("add");
    command.arg(target);
    run_command(command)?;
    Ok(())
}

/// Build the firmware and copy the ELF file out
fn build_firmware(target_dir: &Path, output_path: &Path) -> Result<()> {
    println!("Building firmware");
    run_cargo(&[
        "build",
        "--release",
        "--package",
        "firmware",
        "--target",
        FIRMWARE_TARGET,
    ])?;
    let generated_elf = target_dir
        .join(FIRMWARE_TARGET)
        .join("release")
        .join(FIRMWARE_BIN);
    std::fs::copy(&generated_elf, output_path)?;
    Ok(())
}

/// Turn an ELF file into a UF2
fn make_uf2(input_elf: &Path, output_uf2: &Path, picotool: &Path) -> Result<()> {
    println!(
        "Converting {inp} to {out}",
        inp = input_elf.display(),
        out = output_uf2.display()
    );
    let mut command = std::process::Command::new(picotool);
    command.arg("uf2");
    command.arg("convert");
    command.arg(input_elf);
    command.arg(output_uf2);
    command.arg("-t");
    command.arg("elf");
    run_command(command)?;
    Ok(())
}

/// Run cargo at the top of the workspace
fn run_cargo(args: &[&str]) -> Result<()> {
    let mut command = std::process::Command::new("cargo");
    command.args(args);
    run_command(command)?;
    Ok(())
}

/// Run a command to completion and check it worked OK
fn run_command(mut command: std::process::Command) -> Result<()> {
    if let Some(cwd) = command.get_current_dir() {
        println!("Running {command:?} in {cwd}", cwd = cwd.display());
    } else {
        println!("Running {command:?}");
    }
    let mut child = command.spawn()?;
    let status = child.wait()?;
    if !status.success() {
        return Err(Box::from("Command failed"));
    }
    Ok(())
}

/// Where the picotool releases live
const PICOTOOL_RELEASES: &str =
    "https://github.com/raspberrypi/pico-sdk-tools/releases/download/v2.1.0-0";

/// Fetch picotool, unless we already have it
fn get_picotool(target_dir: &Path) -> Result<PathBuf> {
    let exe = if cfg!(target_os = "windows") {
        "picotool.exe"
    } else {
        "picotool"
    };
    let picotool_path = target_dir.join("picotool").join(exe);
    if std::fs::exists(&picotool_path)? {
        return Ok(picotool_path);
    }

    let asset = picotool_asset()?;
    let archive = target_dir.join(asset);
    println!("Downloading {asset}...");
    download(&format!("{PICOTOOL_RELEASES}/{asset}"), &archive)?;
    unpack(&archive, target_dir)?;

    Ok(picotool_path)
}

/// Which picotool build suits this machine
///
/// The macOS one is a universal binary.
fn picotool_asset() -> Result<&'static str> {
    if cfg!(target_os = "windows") {
        Ok("picotool-2.1.0-x64-win.zip")
    } else if cfg!(target_os = "macos") {
        Ok("picotool-2.1.0-mac.zip")
    } else if cfg!(all(target_os = "linux", target_arch = "x86_64")) {
        Ok("picotool-2.1.0-x86_64-lin.tar.gz")
    } else if cfg!(all(target_os = "linux", target_arch = "aarch64")) {
        Ok("picotool-2.1.0-aarch64-lin.tar.gz")
    } else {
        Err(Box::from(
            "picotool isn't available from https://github.com/raspberrypi/pico-sdk-tools for your platform",
        ))
    }
}

/// Download a file. Powershell on Windows, curl everywhere else.
fn download(url: &str, output: &Path) -> Result<()> {
    let command = if cfg!(target_os = "windows") {
        let mut command = std::process::Command::new("powershell.exe");
        command.arg("-Command");
        command.arg(format!(
            "Invoke-RestMethod -Method Get -Uri {url} -OutFile {file}",
            file = output.display()
        ));
        command
    } else {
        let mut command = std::process::Command::new("curl");
        command.arg(url);
        command.arg("-L");
        command.arg("-o");
        command.arg(output);
        command
    };
    run_command(command)
}

/// Unpack a downloaded archive into `dir`
fn unpack(archive: &Path, dir: &Path) -> Result<()> {
    let is_tarball = archive.to_string_lossy().ends_with(".tar.gz");
    let command = if is_tarball {
        let mut command = std::process::Command::new("tar");
        command.arg("xvzf");
        command.arg(archive);
        command.arg("-C");
        command.arg(dir);
        command
    } else if cfg!(target_os = "windows") {
        let mut command = std::process::Command::new("powershell.exe");
        command.arg("-Command");
        command.arg(format!(
            "Expand-Archive {zip} -DestinationPath {dir}",
            zip = archive.display(),
            dir = dir.display()
        ));
        command
    } else {
        let mut command = std::process::Command::new("unzip");
        command.arg(archive);
        command.arg("-d");
        command.arg(dir);
        command
    };
    run_command(command)
}

// End of file
