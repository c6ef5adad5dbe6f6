//! Line editor for pty-backed sessions.
//!
//! Client keystrokes are parsed with `vte` one byte at a time. Printable
//! characters are inserted at the cursor and echoed; control characters and
//! cursor-key escape sequences edit the line in place. The editor only ever
//! produces output bytes for the client (echo and redraws); it never writes
//! on its own.

use std::collections::VecDeque;

use vte::{Params, Parser, Perform};

use osh_core::constants::HISTORY_LIMIT;

const CTRL_A: u8 = 0x01;
const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const CTRL_E: u8 = 0x05;
const BACKSPACE: u8 = 0x08;
const LF: u8 = 0x0A;
const CR: u8 = 0x0D;
const CTRL_U: u8 = 0x15;
const DEL: u8 = 0x7F;

/// Outcome of feeding one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// A complete line was entered.
    Line(String),
    /// Ctrl-D on an empty line.
    Eof,
}

/// Interactive line editor with history.
pub struct LineEditor {
    parser: Parser,
    state: EditState,
}

#[derive(Default)]
struct EditState {
    prompt: String,
    line: Vec<char>,
    cursor: usize,
    history: VecDeque<String>,
    /// Index into `history` while browsing, 0 being the newest entry.
    browsing: Option<usize>,
    /// Line being edited before browsing started.
    draft: Vec<char>,
    /// Previous byte was CR, so a following LF is swallowed.
    after_cr: bool,
    /// `ESC O` seen; the next printable byte names a key.
    ss3: bool,
    echo: Vec<u8>,
    done: Option<Edit>,
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl LineEditor {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            state: EditState::default(),
        }
    }

    /// Set the prompt used when the line is redrawn.
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.state.prompt = prompt.into();
    }

    /// Feed one input byte.
    pub fn feed(&mut self, byte: u8) -> Option<Edit> {
        let state = &mut self.state;
        let after_cr = std::mem::take(&mut state.after_cr);

        match byte {
            // vte drops DEL in the ground state.
            DEL => state.backspace(),
            LF if after_cr => {}
            _ => self.parser.advance(state, byte),
        }
        self.state.done.take()
    }

    /// Bytes to send back to the client since the last call.
    pub fn take_echo(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.state.echo)
    }

    /// Current contents of the line being edited.
    pub fn line(&self) -> String {
        self.state.line.iter().collect()
    }

    /// Remembered lines, newest first.
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.state.history.iter().map(String::as_str)
    }
}

impl EditState {
    fn insert(&mut self, c: char) {
        self.line.insert(self.cursor, c);
        self.cursor += 1;
        if self.cursor == self.line.len() {
            let mut buf = [0u8; 4];
            self.echo.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        } else {
            self.redraw();
        }
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        self.line.remove(self.cursor);
        self.redraw();
    }

    fn delete_forward(&mut self) {
        if self.cursor < self.line.len() {
            self.line.remove(self.cursor);
            self.redraw();
        }
    }

    fn move_to(&mut self, cursor: usize) {
        let cursor = cursor.min(self.line.len());
        if cursor != self.cursor {
            self.cursor = cursor;
            self.redraw();
        }
    }

    fn replace_line(&mut self, line: Vec<char>) {
        self.cursor = line.len();
        self.line = line;
        self.redraw();
    }

    fn history_up(&mut self) {
        let next = match self.browsing {
            None if !self.history.is_empty() => 0,
            Some(i) if i + 1 < self.history.len() => i + 1,
            _ => return,
        };
        if self.browsing.is_none() {
            self.draft = std::mem::take(&mut self.line);
        }
        self.browsing = Some(next);
        let entry = self.history[next].chars().collect();
        self.replace_line(entry);
    }

    fn history_down(&mut self) {
        match self.browsing {
            None => {}
            Some(0) => {
                self.browsing = None;
                let draft = std::mem::take(&mut self.draft);
                self.replace_line(draft);
            }
            Some(i) => {
                self.browsing = Some(i - 1);
                let entry = self.history[i - 1].chars().collect();
                self.replace_line(entry);
            }
        }
    }

    fn submit(&mut self) {
        self.echo.extend_from_slice(b"\r\n");
        let line: String = self.line.drain(..).collect();
        self.cursor = 0;
        self.browsing = None;
        self.draft.clear();

        if !line.trim().is_empty() && self.history.front() != Some(&line) {
            self.history.push_front(line.clone());
            self.history.truncate(HISTORY_LIMIT);
        }
        self.done = Some(Edit::Line(line));
    }

    fn interrupt(&mut self) {
        self.line.clear();
        self.cursor = 0;
        self.browsing = None;
        self.draft.clear();
        self.echo.extend_from_slice(b"^C\r\n");
        self.echo.extend_from_slice(self.prompt.as_bytes());
    }

    fn redraw(&mut self) {
        self.echo.push(b'\r');
        self.echo.extend_from_slice(self.prompt.as_bytes());
        let line: String = self.line.iter().collect();
        self.echo.extend_from_slice(line.as_bytes());
        self.echo.extend_from_slice(b"\x1b[K");
        let back = self.line.len() - self.cursor;
        if back > 0 {
            self.echo.extend_from_slice(format!("\x1b[{}D", back).as_bytes());
        }
    }

    fn cursor_key(&mut self, key: char) {
        match key {
            'A' => self.history_up(),
            'B' => self.history_down(),
            'C' => self.move_to(self.cursor + 1),
            'D' => self.move_to(self.cursor.saturating_sub(1)),
            'H' => self.move_to(0),
            'F' => self.move_to(self.line.len()),
            _ => {}
        }
    }
}

impl Perform for EditState {
    fn print(&mut self, c: char) {
        if std::mem::take(&mut self.ss3) {
            self.cursor_key(c);
            return;
        }
        self.insert(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            CR => {
                self.after_cr = true;
                self.submit();
            }
            LF => self.submit(),
            BACKSPACE => self.backspace(),
            CTRL_A => self.move_to(0),
            CTRL_E => self.move_to(self.line.len()),
            CTRL_U => {
                self.line.drain(..self.cursor);
                self.cursor = 0;
                self.redraw();
            }
            CTRL_C => self.interrupt(),
            CTRL_D if self.line.is_empty() => self.done = Some(Edit::Eof),
            CTRL_D => self.delete_forward(),
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], _ignore: bool, action: char) {
        if !intermediates.is_empty() {
            return;
        }
        let param0 = params
            .iter()
            .next()
            .and_then(|p| p.first().copied())
            .unwrap_or(0);

        match action {
            'A' | 'B' | 'C' | 'D' | 'H' | 'F' => self.cursor_key(action),
            '~' => match param0 {
                1 | 7 => self.move_to(0),
                4 | 8 => self.move_to(self.line.len()),
                3 => self.delete_forward(),
                _ => {}
            },
            _ => {}
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], _ignore: bool, byte: u8) {
        if !intermediates.is_empty() {
            return;
        }
        match byte {
            b'O' => self.ss3 = true,
            // A lone Escape: the key after it is ordinary input.
            0x20..=0x7e => self.insert(char::from(byte)),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(editor: &mut LineEditor, input: &[u8]) -> Vec<Edit> {
        input.iter().filter_map(|&b| editor.feed(b)).collect()
    }

    fn line(s: &str) -> Edit {
        Edit::Line(s.to_string())
    }

    #[test]
    fn typed_line_with_cr() {
        let mut editor = LineEditor::new();
        assert_eq!(feed_all(&mut editor, b"ls -l\r"), vec![line("ls -l")]);
        assert_eq!(editor.take_echo(), b"ls -l\r\n");
    }

    #[test]
    fn crlf_ends_one_line() {
        let mut editor = LineEditor::new();
        assert_eq!(
            feed_all(&mut editor, b"a\r\nb\n"),
            vec![line("a"), line("b")]
        );
    }

    #[test]
    fn empty_lines_are_returned() {
        let mut editor = LineEditor::new();
        assert_eq!(feed_all(&mut editor, b"\r\r"), vec![line(""), line("")]);
    }

    #[test]
    fn backspace_and_del_remove_characters() {
        let mut editor = LineEditor::new();
        assert_eq!(feed_all(&mut editor, b"lss\x7f\r"), vec![line("ls")]);
        assert_eq!(feed_all(&mut editor, b"cdd\x08\r"), vec![line("cd")]);
    }

    #[test]
    fn cursor_movement_inserts_mid_line() {
        let mut editor = LineEditor::new();
        // "wami", left twice, insert "ho", end, Enter.
        let edits = feed_all(&mut editor, b"wami\x1b[D\x1b[D\x1b[D\x1b[Dwho\x1b[F\r");
        assert_eq!(edits, vec![line("whowami")]);
    }

    #[test]
    fn ctrl_a_and_ctrl_e() {
        let mut editor = LineEditor::new();
        let edits = feed_all(&mut editor, b"elp\x01h\x05!\r");
        assert_eq!(edits, vec![line("help!")]);
    }

    #[test]
    fn ctrl_u_kills_to_start() {
        let mut editor = LineEditor::new();
        assert_eq!(feed_all(&mut editor, b"garbage\x15ls\r"), vec![line("ls")]);
    }

    #[test]
    fn ctrl_c_discards_line() {
        let mut editor = LineEditor::new();
        editor.set_prompt("> ");
        assert!(feed_all(&mut editor, b"rm\x03").is_empty());
        assert_eq!(editor.line(), "");
        assert!(editor.take_echo().ends_with(b"^C\r\n> "));
        assert_eq!(feed_all(&mut editor, b"ls\r"), vec![line("ls")]);
    }

    #[test]
    fn ctrl_d_on_empty_line_is_eof() {
        let mut editor = LineEditor::new();
        assert_eq!(feed_all(&mut editor, b"\x04"), vec![Edit::Eof]);
    }

    #[test]
    fn ctrl_d_mid_line_deletes_forward() {
        let mut editor = LineEditor::new();
        let edits = feed_all(&mut editor, b"lsx\x1b[D\x04\r");
        assert_eq!(edits, vec![line("ls")]);
    }

    #[test]
    fn delete_key_and_home_end_tilde_codes() {
        let mut editor = LineEditor::new();
        let edits = feed_all(&mut editor, b"xls\x1b[1~\x1b[3~\x1b[4~!\r");
        assert_eq!(edits, vec![line("ls!")]);
    }

    #[test]
    fn history_up_and_down() {
        let mut editor = LineEditor::new();
        feed_all(&mut editor, b"first\rsecond\r");
        assert_eq!(editor.history().collect::<Vec<_>>(), ["second", "first"]);

        let edits = feed_all(&mut editor, b"dra\x1b[A\x1b[A\r");
        assert_eq!(edits, vec![line("first")]);

        let edits = feed_all(&mut editor, b"dra\x1b[A\x1b[Bft\r");
        assert_eq!(edits, vec![line("draft")]);
    }

    #[test]
    fn ss3_cursor_keys() {
        let mut editor = LineEditor::new();
        feed_all(&mut editor, b"whoami\r");
        assert_eq!(feed_all(&mut editor, b"\x1bOA\r"), vec![line("whoami")]);
        assert_eq!(feed_all(&mut editor, b"bc\x1bOHa\r"), vec![line("abc")]);
    }

    #[test]
    fn history_is_capped_and_skips_blank_and_repeats() {
        let mut editor = LineEditor::new();
        for i in 0..HISTORY_LIMIT + 10 {
            feed_all(&mut editor, format!("cmd{}\r", i).as_bytes());
        }
        feed_all(&mut editor, b"   \r");
        let last = format!("cmd{}", HISTORY_LIMIT + 9);
        feed_all(&mut editor, format!("{}\r", last).as_bytes());

        let history: Vec<_> = editor.history().collect();
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history[0], last);
    }

    #[test]
    fn utf8_input() {
        let mut editor = LineEditor::new();
        let edits = feed_all(&mut editor, "cd café\r".as_bytes());
        assert_eq!(edits, vec![line("cd café")]);
    }

    #[test]
    fn lone_escape_keeps_next_key() {
        let mut editor = LineEditor::new();
        assert_eq!(feed_all(&mut editor, b"\x1bls\r"), vec![line("ls")]);
    }

    #[test]
    fn ss3_after_escape_still_moves_cursor() {
        let mut editor = LineEditor::new();
        assert_eq!(feed_all(&mut editor, b"ab\x1bOHx\r"), vec![line("xab")]);
    }
}
