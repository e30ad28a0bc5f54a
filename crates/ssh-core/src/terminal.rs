//! Local terminal handling: size probing, raw-mode switching and PTY mode export.

use std::{
    env, io,
    os::fd::{AsFd, BorrowedFd},
};

use russh::Pty;
use rustix::{
    fs::{OFlags, fcntl_getfl, fcntl_setfl},
    termios::{self, ControlModes, InputModes, LocalModes, OptionalActions, OutputModes, SpecialCodeIndex as Sc, Termios},
};
use tracing::{debug, warn};

/// Terminal dimensions in character cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TermSize {
    pub cols: u16,
    pub lines: u16,
}

impl TermSize {
    pub const FALLBACK: TermSize = TermSize { cols: 80, lines: 24 };

    pub fn new(cols: u16, lines: u16) -> Self {
        Self { cols, lines }
    }

    /// Dimensions as sent in SSH `pty-req`/`window-change`; zero is never sent.
    pub fn as_wire(self) -> (u32, u32) {
        (self.cols.max(1) as u32, self.lines.max(1) as u32)
    }
}

impl std::fmt::Display for TermSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.lines)
    }
}

/// Query the size of the controlling terminal.
pub fn current_size() -> Option<TermSize> {
    crossterm::terminal::size().ok().map(|(cols, lines)| TermSize::new(cols, lines))
}

/// Size advertised through `COLUMNS`/`LINES`, used when stdout is not a terminal.
pub fn size_from_env() -> Option<TermSize> {
    let cols = env::var("COLUMNS").ok()?.trim().parse().ok()?;
    let lines = env::var("LINES").ok()?.trim().parse().ok()?;
    Some(TermSize::new(cols, lines))
}

/// Best available size: the live terminal, then the environment, then 80x24.
pub fn initial_size() -> TermSize {
    current_size().or_else(size_from_env).unwrap_or(TermSize::FALLBACK)
}

/// Switches the local input into raw, non-blocking mode and back.
///
/// Implementations must restore exactly the state captured by `enter_raw`.
pub trait TerminalControl: Send {
    fn enter_raw(&mut self) -> io::Result<()>;
    fn restore(&mut self) -> io::Result<()>;
}

struct Snapshot {
    termios: Option<Termios>,
    flags: OFlags,
}

impl Snapshot {
    /// Switch `fd` to raw mode, then hand the non-blocking flags to `set_flags`.
    /// If that second step fails the original termios is put back.
    fn engage<F>(fd: BorrowedFd<'_>, set_flags: F) -> io::Result<Self>
    where
        F: FnOnce(BorrowedFd<'_>, OFlags) -> rustix::io::Result<()>,
    {
        let flags = fcntl_getfl(fd)?;
        let termios = match termios::tcgetattr(fd) {
            Ok(original) => {
                let mut raw = original.clone();
                raw.make_raw();
                termios::tcsetattr(fd, OptionalActions::Drain, &raw)?;
                Some(original)
            }
            Err(err) => {
                debug!(?err, "stdin is not a terminal; leaving line discipline untouched");
                None
            }
        };
        if let Err(err) = set_flags(fd, flags | OFlags::NONBLOCK) {
            if let Some(original) = &termios
                && let Err(restore_err) = termios::tcsetattr(fd, OptionalActions::Drain, original)
            {
                warn!(?restore_err, "failed to undo raw mode after O_NONBLOCK error");
            }
            return Err(err.into());
        }
        Ok(Self { termios, flags })
    }
}

/// [`TerminalControl`] over the process stdin.
#[derive(Default)]
pub struct StdinTerminal {
    saved: Option<Snapshot>,
}

impl StdinTerminal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TerminalControl for StdinTerminal {
    fn enter_raw(&mut self) -> io::Result<()> {
        if self.saved.is_some() {
            return Ok(());
        }
        let stdin = io::stdin();
        let snapshot = Snapshot::engage(stdin.as_fd(), |fd, flags| fcntl_setfl(fd, flags))?;
        self.saved = Some(snapshot);
        Ok(())
    }

    fn restore(&mut self) -> io::Result<()> {
        let Some(snapshot) = self.saved.take() else {
            return Ok(());
        };
        let stdin = io::stdin();
        let fd = stdin.as_fd();
        let flags = fcntl_setfl(fd, snapshot.flags);
        if let Some(original) = &snapshot.termios {
            termios::tcsetattr(fd, OptionalActions::Drain, original)?;
        }
        Ok(flags?)
    }
}

/// Tracks whether the local terminal is currently raw and restores it exactly once.
///
/// Dropping an engaged guard restores the terminal, so a panic or an early
/// return cannot leave the user's shell in raw mode.
pub struct RawModeGuard {
    control: Box<dyn TerminalControl>,
    raw: bool,
}

impl RawModeGuard {
    pub fn new(control: Box<dyn TerminalControl>) -> Self {
        Self { control, raw: false }
    }

    pub fn engage(&mut self) -> io::Result<()> {
        if !self.raw {
            self.control.enter_raw()?;
            self.raw = true;
        }
        Ok(())
    }

    pub fn restore(&mut self) -> io::Result<()> {
        if !self.raw {
            return Ok(());
        }
        self.raw = false;
        self.control.restore()
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            warn!(?err, "failed to restore terminal mode");
        }
    }
}

/// Read the local terminal settings and convert them into SSH PTY modes.
pub fn current_pty_modes() -> Vec<(Pty, u32)> {
    let stdin = io::stdin();
    match termios::tcgetattr(stdin.as_fd()) {
        Ok(term) => modes_from_termios(&term),
        Err(err) => {
            debug!(?err, "no local termios to mirror; using default PTY modes");
            default_pty_modes()
        }
    }
}

/// Reasonable PTY modes for a remote shell when there is no local terminal to mirror.
pub fn default_pty_modes() -> Vec<(Pty, u32)> {
    const DEFAULT_SPEED: u32 = 38400;
    vec![
        (Pty::VINTR, 0x03),
        (Pty::VQUIT, 0x1c),
        (Pty::VERASE, 0x7f),
        (Pty::VKILL, 0x15),
        (Pty::VEOF, 0x04),
        (Pty::VSTART, 0x11),
        (Pty::VSTOP, 0x13),
        (Pty::VSUSP, 0x1a),
        (Pty::VWERASE, 0x17),
        (Pty::ISIG, 1),
        (Pty::ICANON, 1),
        (Pty::ECHO, 1),
        (Pty::ECHOE, 1),
        (Pty::ECHOK, 1),
        (Pty::IEXTEN, 1),
        (Pty::IXON, 1),
        (Pty::ICRNL, 1),
        (Pty::OPOST, 1),
        (Pty::ONLCR, 1),
        (Pty::CS8, 1),
        (Pty::TTY_OP_OSPEED, DEFAULT_SPEED),
        (Pty::TTY_OP_ISPEED, DEFAULT_SPEED),
    ]
}

const SPECIAL_CODES: &[(Sc, Pty)] = &[
    (Sc::VINTR, Pty::VINTR),
    (Sc::VQUIT, Pty::VQUIT),
    (Sc::VERASE, Pty::VERASE),
    (Sc::VKILL, Pty::VKILL),
    (Sc::VEOF, Pty::VEOF),
    (Sc::VSTART, Pty::VSTART),
    (Sc::VSTOP, Pty::VSTOP),
    (Sc::VSUSP, Pty::VSUSP),
    (Sc::VEOL, Pty::VEOL),
    (Sc::VEOL2, Pty::VEOL2),
    (Sc::VREPRINT, Pty::VREPRINT),
    (Sc::VLNEXT, Pty::VLNEXT),
    (Sc::VWERASE, Pty::VWERASE),
];

const LOCAL_FLAGS: &[(LocalModes, Pty)] = &[
    (LocalModes::ISIG, Pty::ISIG),
    (LocalModes::ICANON, Pty::ICANON),
    (LocalModes::ECHO, Pty::ECHO),
    (LocalModes::ECHOE, Pty::ECHOE),
    (LocalModes::ECHOK, Pty::ECHOK),
    (LocalModes::ECHOCTL, Pty::ECHOCTL),
    (LocalModes::IEXTEN, Pty::IEXTEN),
];

const INPUT_FLAGS: &[(InputModes, Pty)] = &[
    (InputModes::IXON, Pty::IXON),
    (InputModes::IXOFF, Pty::IXOFF),
    (InputModes::IGNPAR, Pty::IGNPAR),
    (InputModes::INPCK, Pty::INPCK),
    (InputModes::ISTRIP, Pty::ISTRIP),
    (InputModes::ICRNL, Pty::ICRNL),
    (InputModes::IGNCR, Pty::IGNCR),
    (InputModes::IMAXBEL, Pty::IMAXBEL),
];

const OUTPUT_FLAGS: &[(OutputModes, Pty)] = &[
    (OutputModes::OPOST, Pty::OPOST),
    (OutputModes::ONLCR, Pty::ONLCR),
    (OutputModes::OCRNL, Pty::OCRNL),
    (OutputModes::ONOCR, Pty::ONOCR),
    (OutputModes::ONLRET, Pty::ONLRET),
];

fn modes_from_termios(term: &Termios) -> Vec<(Pty, u32)> {
    let mut modes = Vec::with_capacity(40);
    for &(index, pty) in SPECIAL_CODES {
        modes.push((pty, term.special_codes[index] as u32));
    }
    for &(flag, pty) in LOCAL_FLAGS {
        modes.push((pty, term.local_modes.contains(flag) as u32));
    }
    for &(flag, pty) in INPUT_FLAGS {
        modes.push((pty, term.input_modes.contains(flag) as u32));
    }
    for &(flag, pty) in OUTPUT_FLAGS {
        modes.push((pty, term.output_modes.contains(flag) as u32));
    }
    let control = term.control_modes;
    modes.push((Pty::PARENB, control.contains(ControlModes::PARENB) as u32));
    modes.push((Pty::PARODD, control.contains(ControlModes::PARODD) as u32));
    if control.contains(ControlModes::CS8) {
        modes.push((Pty::CS8, 1));
    } else if control.contains(ControlModes::CS7) {
        modes.push((Pty::CS7, 1));
    }
    modes.push((Pty::TTY_OP_OSPEED, term.output_speed()));
    modes.push((Pty::TTY_OP_ISPEED, term.input_speed()));
    modes
}
