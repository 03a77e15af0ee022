//! `:` palette commands and their fuzzy lookup.

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// Sections reachable from the palette, in display order
pub const COMMANDS: &[Command] = &[
  Command {
    name: "dashboard",
    aliases: &["d", "home", "stats"],
    description: "School overview",
  },
  Command {
    name: "students",
    aliases: &["s", "student", "pupils"],
    description: "Browse students",
  },
  Command {
    name: "classes",
    aliases: &["c", "class"],
    description: "Browse classes",
  },
  Command {
    name: "parents",
    aliases: &["p", "parent", "guardians"],
    description: "Browse parents",
  },
  Command {
    name: "users",
    aliases: &["u", "user", "staff"],
    description: "Admin and security accounts",
  },
  Command {
    name: "attendance",
    aliases: &["a", "att", "checkins"],
    description: "Check-in and check-out log",
  },
  Command {
    name: "qrcodes",
    aliases: &["qr", "cards"],
    description: "Student QR codes for ID cards",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit rollcall",
  },
];

/// How well `input` names `cmd`, lower is better. Exact beats prefix beats
/// substring, and the command name beats its aliases at each level.
fn rank(cmd: &Command, input: &str) -> Option<u8> {
  let aliases = || cmd.aliases.iter();
  if cmd.name == input {
    Some(0)
  } else if aliases().any(|a| *a == input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if aliases().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if aliases().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

/// Commands matching `input`, best match first. Empty input lists them all.
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input = input.trim().to_lowercase();
  let mut ranked: Vec<(u8, &'static Command)> = COMMANDS
    .iter()
    .filter_map(|cmd| {
      if input.is_empty() {
        Some((0, cmd))
      } else {
        rank(cmd, &input).map(|r| (r, cmd))
      }
    })
    .collect();

  // Stable, so equal ranks keep table order
  ranked.sort_by_key(|(r, _)| *r);
  ranked.into_iter().map(|(_, cmd)| cmd).collect()
}
