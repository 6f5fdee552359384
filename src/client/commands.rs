use crate::error_handling::types::ClientError;
use std::str::FromStr;

pub const DEFAULT_HISTORY: usize = 10;

/// Menu order; a command can also be typed as its 1-based position.
pub const MENU: [(&str, &str, &str); 13] = [
    ("profile", "<name> <age>", "save the profile locally and send it over TCP"),
    ("listen", "", "start the WebSocket event listener"),
    ("stop", "", "stop the WebSocket event listener"),
    ("location", "<lat> <lon>", "send a location over UDP and get a hint"),
    ("select", "<name>", "switch to another server"),
    ("add-server", "<name> <ip> <tcp> [ws] [udp]", "register a server"),
    ("remove-server", "<name>", "forget a server"),
    ("server", "", "show the current server and session"),
    ("history", "[n]", "show the last cached events"),
    ("profiles", "", "list the locally saved profiles"),
    ("delete-profile", "<name>", "delete a locally saved profile"),
    ("help", "", "show this menu"),
    ("exit", "", "stop the listener and quit"),
];

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Profile { name: String, age: Option<u32> },
    Listen,
    Stop,
    Location { latitude: f64, longitude: f64 },
    Select(String),
    AddServer {
        name: String,
        ip: String,
        tcp_port: u16,
        ws_port: Option<u16>,
        udp_port: Option<u16>,
    },
    RemoveServer(String),
    Server,
    History(usize),
    Profiles,
    DeleteProfile(String),
    Help,
    Exit,
}

impl FromStr for Command {
    type Err = ClientError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(first) = words.next() else {
            return Err(invalid("empty command"));
        };
        let args: Vec<&str> = words.collect();

        let keyword = match first.parse::<usize>() {
            Ok(position) => MENU
                .get(position.wrapping_sub(1))
                .map(|(keyword, _, _)| *keyword)
                .ok_or_else(|| invalid(&format!("no menu entry {}", position)))?,
            Err(_) => first,
        };

        match keyword.to_lowercase().as_str() {
            "profile" => {
                let (name, age) = match args.split_last() {
                    Some((last, rest)) if !rest.is_empty() => match last.parse::<u32>() {
                        Ok(age) => (rest.join(" "), Some(age)),
                        Err(_) => (args.join(" "), None),
                    },
                    _ => (args.join(" "), None),
                };
                if name.is_empty() {
                    return Err(invalid("usage: profile <name> <age>"));
                }
                Ok(Command::Profile { name, age })
            }
            "listen" => Ok(Command::Listen),
            "stop" => Ok(Command::Stop),
            "location" => {
                let [lat, lon] = args[..] else {
                    return Err(invalid("usage: location <lat> <lon>"));
                };
                let latitude = parse_coordinate(lat, 90.0, "latitude")?;
                let longitude = parse_coordinate(lon, 180.0, "longitude")?;
                Ok(Command::Location { latitude, longitude })
            }
            "select" => match args[..] {
                [name] => Ok(Command::Select(name.to_string())),
                _ => Err(invalid("usage: select <name>")),
            },
            "add-server" => {
                if !(3..=5).contains(&args.len()) {
                    return Err(invalid("usage: add-server <name> <ip> <tcp> [ws] [udp]"));
                }
                Ok(Command::AddServer {
                    name: args[0].to_string(),
                    ip: args[1].to_string(),
                    tcp_port: parse_port(args[2])?,
                    ws_port: args.get(3).map(|p| parse_port(p)).transpose()?,
                    udp_port: args.get(4).map(|p| parse_port(p)).transpose()?,
                })
            }
            "remove-server" => match args[..] {
                [name] => Ok(Command::RemoveServer(name.to_string())),
                _ => Err(invalid("usage: remove-server <name>")),
            },
            "server" => Ok(Command::Server),
            "history" => match args[..] {
                [] => Ok(Command::History(DEFAULT_HISTORY)),
                [n] => n
                    .parse::<usize>()
                    .map(Command::History)
                    .map_err(|_| invalid("usage: history [n]")),
                _ => Err(invalid("usage: history [n]")),
            },
            "profiles" => Ok(Command::Profiles),
            "delete-profile" => {
                let name = args.join(" ");
                if name.is_empty() {
                    return Err(invalid("usage: delete-profile <name>"));
                }
                Ok(Command::DeleteProfile(name))
            }
            "help" => Ok(Command::Help),
            "exit" | "quit" => Ok(Command::Exit),
            other => Err(invalid(&format!("unknown command '{}', try 'help'", other))),
        }
    }
}

pub fn print_menu() {
    println!("Commands:");
    for (position, (keyword, usage, summary)) in MENU.iter().enumerate() {
        let head = format!("{} {}", keyword, usage);
        println!("  {:>2}. {:<40} {}", position + 1, head.trim_end(), summary);
    }
}

fn invalid(message: &str) -> ClientError {
    ClientError::InvalidCommand(message.to_string())
}

fn parse_port(raw: &str) -> Result<u16, ClientError> {
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(invalid(&format!("'{}' is not a port", raw))),
    }
}

fn parse_coordinate(raw: &str, bound: f64, what: &str) -> Result<f64, ClientError> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value.abs() <= bound => Ok(value),
        _ => Err(invalid(&format!("{} must be a number within ±{}", what, bound))),
    }
}
