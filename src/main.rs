//! Gaming lights CLI tool
//!
//! Supports the Philips amBX gaming lights over raw USB interrupt transfers and
//! the MadCatz Cyborg gaming light over HID feature reports.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io::{self, Write};
use std::num::ParseIntError;
use std::str::FromStr;
use std::thread;

use clap::builder::EnumValueParser;
use clap::{crate_description, crate_name, crate_version, Arg, ArgMatches, Command, ValueEnum};
use hidapi::HidApi;
use log::debug;

use crate::ambx::AmbxZone;
use crate::controller::{LightingCommand, Registered};
use crate::cyborg::Position;
use crate::usb::LibUsb;

mod ambx;
mod controller;
mod cyborg;
mod error;
mod hid;
mod usb;

/// Colors used to test the available zones.
const TESTCOLORS: [Rgb; 5] = [
    Rgb { r: 0xff, g: 0x00, b: 0x00 },
    Rgb { r: 0x00, g: 0xff, b: 0x00 },
    Rgb { r: 0x00, g: 0x00, b: 0xff },
    Rgb { r: 0xff, g: 0x00, b: 0xff },
    Rgb { r: 0xff, g: 0xff, b: 0x00 },
];

/// Supported lighting devices.
#[derive(ValueEnum, Default, PartialEq, Eq, Debug, Copy, Clone)]
enum LightDevice {
    #[default]
    Ambx,
    Cyborg,
}

impl LightDevice {
    /// Default USB vendor and product ID.
    fn ids(&self) -> (u16, u16) {
        match self {
            Self::Ambx => (ambx::VENDOR_ID, ambx::PRODUCT_ID),
            Self::Cyborg => (cyborg::VENDOR_ID, cyborg::PRODUCT_ID),
        }
    }
}

/// RGB color.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
struct Rgb {
    r: u8,
    g: u8,
    b: u8,
}

impl FromStr for Rgb {
    type Err = ();

    fn from_str(s: &str) -> Result<Rgb, ()> {
        let chars = if s.starts_with("0x") && s.len() == 8 {
            &s[2..]
        } else {
            return Err(());
        };

        match u32::from_str_radix(chars, 16) {
            Ok(mut color) => {
                let b = (color & 0xff) as u8;
                color >>= 8;
                let g = (color & 0xff) as u8;
                color >>= 8;
                let r = color as u8;
                Ok(Rgb { r, g, b })
            },
            Err(_) => Err(()),
        }
    }
}

impl Display for Rgb {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Light intensity in percent.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
struct Intensity(u8);

impl FromStr for Intensity {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Intensity(u8::from_str(s)?))
    }
}

/// Duration in milliseconds.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
struct Duration(u32);

impl Default for Duration {
    fn default() -> Self {
        Self(5000)
    }
}

impl FromStr for Duration {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Duration(u32::from_str(s)?))
    }
}

impl From<Duration> for std::time::Duration {
    fn from(duration: Duration) -> Self {
        std::time::Duration::from_millis(duration.0.into())
    }
}

/// USB vendor or product ID.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
struct UsbId(u16);

impl FromStr for UsbId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        Ok(UsbId(u16::from_str_radix(digits, 16)?))
    }
}

/// Lighting state requested on the command line.
#[derive(Debug)]
struct Config {
    device: LightDevice,
    vendor_id: u16,
    product_id: u16,
    zone: Option<AmbxZone>,
    color: Rgb,
    intensity: Option<Intensity>,
    position: Option<Position>,
    hold_time: Duration,
}

impl Config {
    fn from_cli(matches: &ArgMatches) -> Self {
        let device = matches.get_one::<LightDevice>("device").copied().unwrap_or_default();
        let (vendor_id, product_id) = device.ids();

        let mut config = Config {
            device,
            vendor_id,
            product_id,
            zone: matches.get_one::<AmbxZone>("zone").copied(),
            color: Rgb::default(),
            intensity: None,
            position: matches.get_one::<Position>("position").copied(),
            hold_time: Duration::default(),
        };

        if let Some(Ok(UsbId(id))) = cli_from_str(matches, "vid") {
            config.vendor_id = id;
        }
        if let Some(Ok(UsbId(id))) = cli_from_str(matches, "pid") {
            config.product_id = id;
        }

        config.intensity = match cli_from_str(matches, "intensity") {
            Some(Ok(intensity)) => Some(intensity),
            Some(Err(_)) => {
                eprintln!("\x1b[31mInvalid CLI intensity parameter.\x1b[0m\n");
                None
            },
            None => None,
        };
        replace_from_str(&mut config.hold_time, matches, "hold-time");

        config
    }

    /// Commands applying this config to the device.
    fn commands(&self) -> Vec<LightingCommand> {
        let color = self.color;

        match self.device {
            LightDevice::Ambx => {
                let zones = self.zone.map_or(AmbxZone::ALL.to_vec(), |zone| vec![zone]);
                zones
                    .into_iter()
                    .map(|zone| LightingCommand::SetColor { led_id: zone.led_id(), color })
                    .collect()
            },
            LightDevice::Cyborg => {
                let mut commands = vec![LightingCommand::SetColor { led_id: 0, color }];

                if let Some(Intensity(intensity)) = self.intensity {
                    commands.push(LightingCommand::SetIntensity(intensity));
                }

                if let Some(position) = self.position {
                    let (byte1, byte2) = position.bytes();
                    commands.push(LightingCommand::SetPosition(byte1, byte2));
                }

                commands
            },
        }
    }
}

fn main() {
    env_logger::init();

    let cli = cli().get_matches();
    match cli.subcommand() {
        Some(("list", matches)) => list(matches),
        Some(("zonetest", matches)) => zonetest(matches),
        _ => gamelights(&cli),
    }
}

/// Print all detected lights.
fn list(matches: &ArgMatches) {
    let config = Config::from_cli(matches);

    let controllers = match detect(&config) {
        Ok(controllers) => controllers,
        Err(err) => {
            eprintln!("\x1b[31mError:\x1b[0m {err}");
            return;
        },
    };

    if controllers.is_empty() {
        println!("No {:?} lights found.", config.device);
    }

    for Registered { name, controller } in &controllers {
        println!("{name}");
        println!("  Location: {}", controller.location());

        let serial = controller.serial();
        if !serial.is_empty() {
            println!("  Serial:   {serial}");
        }
    }
}

/// Mark all amBX zones in a unique color.
fn zonetest(matches: &ArgMatches) {
    println!("Are you sure you want to test the available light zones?");
    println!("\x1b[31mThis will override the current light colors\x1b[0m.");
    print!(" [y/N] > ");
    let _ = io::stdout().flush();

    // Abort unless the user agrees to override the lights.
    if stdin_nextline().to_lowercase() != "y" {
        println!("Bailing out.");
        return;
    }

    let config = Config::from_cli(matches);
    if config.device != LightDevice::Ambx {
        eprintln!("\x1b[31mError:\x1b[0m zone test requires amBX lights");
        return;
    }

    let controllers = match detect(&config) {
        Ok(controllers) if !controllers.is_empty() => controllers,
        Ok(_) => {
            eprintln!("\x1b[31mError:\x1b[0m no amBX lights found");
            return;
        },
        Err(err) => {
            eprintln!("\x1b[31mError:\x1b[0m {err}");
            return;
        },
    };

    println!("\nTesting available light zones...\n");

    for (zone, color) in AmbxZone::ALL.iter().zip(TESTCOLORS) {
        println!("Color for zone {:?}: {}", zone, color);

        let command = LightingCommand::SetColor { led_id: zone.led_id(), color };
        for registered in &controllers {
            registered.controller.send_command(&command);
        }
    }

    thread::sleep(config.hold_time.into());
}

/// Apply the configured light state.
fn gamelights(matches: &ArgMatches) {
    let mut config = Config::from_cli(matches);
    config.color = required_color(matches);

    match write_config(&config) {
        Ok(()) => println!("\x1b[32mSuccessfully applied changes.\x1b[0m"),
        Err(err) => eprintln!("\x1b[31mError:\x1b[0m {err}"),
    }
}

/// Send a config to all detected lights and keep it for the hold time.
fn write_config(config: &Config) -> Result<(), Box<dyn Error>> {
    let controllers = detect(config)?;
    if controllers.is_empty() {
        return Err("unable to open device (root permissions required)".into());
    }

    let commands = config.commands();
    for Registered { name, controller } in &controllers {
        debug!("Applying {} commands to {name}", commands.len());

        for command in &commands {
            controller.send_command(command);
        }
    }

    // amBX lights are switched off once the session is closed.
    thread::sleep(config.hold_time.into());

    Ok(())
}

/// Run device detection for the configured device.
fn detect(config: &Config) -> Result<Vec<Registered>, Box<dyn Error>> {
    let mut registry: Vec<Registered> = Vec::new();

    match config.device {
        LightDevice::Ambx => {
            ambx::register_if_found(&LibUsb, config.vendor_id, config.product_id, &mut registry)
        },
        LightDevice::Cyborg => {
            let api = HidApi::new().map_err(|err| format!("unable to access HID: {err}"))?;
            cyborg::register_if_found(&api, config.vendor_id, config.product_id, &mut registry);
        },
    }

    Ok(registry)
}

/// Get clap CLI definition.
fn cli() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .author("Christian Duerr <contact@christianduerr.com>")
        .about(crate_description!())
        .subcommand(Command::new("list").about("List detected lights"))
        .subcommand(Command::new("zonetest").about("Test available amBX zones"))
        .arg(
            Arg::new("device")
                .help("Lighting device")
                .long("device")
                .short('d')
                .global(true)
                .ignore_case(true)
                .value_parser(EnumValueParser::<LightDevice>::new()),
        )
        .arg(Arg::new("vid").help("USB vendor ID [0xVVVV]").long("vid").global(true))
        .arg(Arg::new("pid").help("USB product ID [0xPPPP]").long("pid").global(true))
        .arg(
            Arg::new("color")
                .help("LED color in RGB [0xRRGGBB]")
                .long("color")
                .short('c')
                .global(true),
        )
        .arg(
            Arg::new("zone")
                .help("amBX zone, all zones if omitted")
                .long("zone")
                .short('z')
                .global(true)
                .ignore_case(true)
                .value_parser(EnumValueParser::<AmbxZone>::new()),
        )
        .arg(
            Arg::new("intensity")
                .help("Cyborg light intensity [possible values: 0..=100]")
                .long("intensity")
                .short('i')
                .global(true),
        )
        .arg(
            Arg::new("position")
                .help("Cyborg light position")
                .long("position")
                .short('p')
                .global(true)
                .ignore_case(true)
                .value_parser(EnumValueParser::<Position>::new()),
        )
        .arg(
            Arg::new("hold-time")
                .help("Time in milliseconds to keep the lights before closing the device")
                .long("hold-time")
                .global(true),
        )
}

/// Convert a CLI option from the parameter string.
#[inline]
fn cli_from_str<T>(matches: &ArgMatches, name: &str) -> Option<Result<T, <T as FromStr>::Err>>
where
    T: FromStr,
{
    matches.get_one::<String>(name).map(|value| T::from_str(value))
}

/// Replace config value with the CLI parameter if it is present.
#[inline]
fn replace_from_str<T: FromStr>(option: &mut T, matches: &ArgMatches, name: &str) {
    if let Some(Ok(value)) = cli_from_str(matches, name) {
        *option = value;
    }
}

/// Read the color option from CLI or prompt for STDIN if not present.
fn required_color<T: FromStr>(matches: &ArgMatches) -> T {
    match cli_from_str(matches, "color") {
        Some(Ok(value)) => return value,
        Some(Err(_)) => eprintln!("\x1b[31mInvalid CLI color parameter.\x1b[0m\n"),
        _ => (),
    }

    loop {
        // Query the user for the option.
        print!("Please select a color (format: 0xRRGGBB):\n > ");
        let _ = io::stdout().flush();

        let input = stdin_nextline();

        match T::from_str(&input) {
            Ok(value) => {
                println!();
                break value;
            },
            Err(_) => eprintln!(
                "\x1b[31mColor '{}' does not match format 0xRRGGBB, please try again.\x1b[0m\n",
                input
            ),
        }
    }
}

/// Read next line from STDIN.
#[inline]
fn stdin_nextline() -> String {
    let mut input = String::new();

    let _ = io::stdin().read_line(&mut input);
    input = input.trim().to_string();

    input
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(device: LightDevice) -> Config {
        let (vendor_id, product_id) = device.ids();
        Config {
            device,
            vendor_id,
            product_id,
            zone: None,
            color: Rgb { r: 0x10, g: 0x20, b: 0x30 },
            intensity: None,
            position: None,
            hold_time: Duration::default(),
        }
    }

    #[test]
    fn testcolors_match_zones() {
        assert_eq!(AmbxZone::ALL.len(), TESTCOLORS.len());
    }

    #[test]
    fn rgb_from_str() {
        assert_eq!(Rgb::from_str("0x102030"), Ok(Rgb { r: 0x10, g: 0x20, b: 0x30 }));
        assert_eq!(Rgb::from_str("102030"), Err(()));
        assert_eq!(Rgb::from_str("0x10203g"), Err(()));
        assert_eq!(Rgb { r: 0xab, g: 0, b: 0x01 }.to_string(), "0xab0001");
    }

    #[test]
    fn usb_id_from_str() {
        assert_eq!(UsbId::from_str("0x06A3"), Ok(UsbId(0x06a3)));
        assert_eq!(UsbId::from_str("083f"), Ok(UsbId(0x083f)));
        assert!(UsbId::from_str("0x10000").is_err());
    }

    #[test]
    fn invalid_intensity_is_ignored() {
        let matches = cli().get_matches_from(["gamelights", "-d", "cyborg", "--intensity", "300"]);
        let config = Config::from_cli(&matches);

        assert_eq!(config.device, LightDevice::Cyborg);
        assert_eq!(config.intensity, None);

        let matches = cli().get_matches_from(["gamelights", "--intensity", "80"]);
        assert_eq!(Config::from_cli(&matches).intensity, Some(Intensity(80)));
    }

    #[test]
    fn ambx_commands_cover_all_zones() {
        let commands = config(LightDevice::Ambx).commands();

        let leds: Vec<_> = commands
            .iter()
            .map(|command| match command {
                LightingCommand::SetColor { led_id, .. } => *led_id,
                command => panic!("unexpected command {command:?}"),
            })
            .collect();
        assert_eq!(leds, [0x0b, 0x1b, 0x2b, 0x3b, 0x4b]);
    }

    #[test]
    fn ambx_commands_single_zone() {
        let config = Config { zone: Some(AmbxZone::WallCenter), ..config(LightDevice::Ambx) };

        let color = Rgb { r: 0x10, g: 0x20, b: 0x30 };
        assert_eq!(config.commands(), [LightingCommand::SetColor { led_id: 0x3b, color }]);
    }

    #[test]
    fn cyborg_commands() {
        let config = Config {
            intensity: Some(Intensity(80)),
            position: Some(Position::S),
            ..config(LightDevice::Cyborg)
        };

        let color = Rgb { r: 0x10, g: 0x20, b: 0x30 };
        assert_eq!(config.commands(), [
            LightingCommand::SetColor { led_id: 0, color },
            LightingCommand::SetIntensity(80),
            LightingCommand::SetPosition(0x10, 0x00),
        ]);
    }
}
