use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

use crate::session::Session;

/// What the event loop should do beyond the state change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    None,
    /// Ask the supervisor to cancel the run
    Interrupt,
}

/// Handle a mouse event
pub fn handle_mouse(session: &mut Session, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollUp => {
            for _ in 0..3 {
                session.scroll_up();
            }
        }
        MouseEventKind::ScrollDown => {
            for _ in 0..3 {
                session.scroll_down();
            }
        }
        _ => {}
    }
}

/// Handle a key event and update session state accordingly
pub fn handle_key(session: &mut Session, key: KeyEvent, page_size: usize) -> Action {
    // Help overlay takes priority
    if session.show_help {
        if matches!(
            key.code,
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?')
        ) {
            session.show_help = false;
        }
        return Action::None;
    }

    match key.code {
        // While the child runs, quit keys request interruption; once it
        // has terminated they leave the final screen.
        KeyCode::Char('q') | KeyCode::Enter | KeyCode::Esc if session.finished() => {
            session.should_quit = true;
            Action::None
        }
        KeyCode::Char('q') => request_interrupt(session),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            if session.finished() {
                session.should_quit = true;
                Action::None
            } else {
                request_interrupt(session)
            }
        }

        KeyCode::Char('?') => {
            session.show_help = true;
            Action::None
        }

        KeyCode::Char('j') | KeyCode::Down => {
            session.scroll_down();
            Action::None
        }
        KeyCode::Char('k') | KeyCode::Up => {
            session.scroll_up();
            Action::None
        }
        KeyCode::PageDown => {
            session.scroll_page_down(page_size);
            Action::None
        }
        KeyCode::PageUp => {
            session.scroll_page_up(page_size);
            Action::None
        }
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            session.scroll_page_down(page_size);
            Action::None
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            session.scroll_page_up(page_size);
            Action::None
        }
        KeyCode::Char('g') => {
            session.go_to_top();
            Action::None
        }
        KeyCode::Char('G') => {
            session.go_to_bottom();
            Action::None
        }

        _ => Action::None,
    }
}

/// Set the waiting message and ask the caller to interrupt the child
pub fn request_interrupt(session: &mut Session) -> Action {
    session.status_message = Some("Interrupting, waiting for the child to exit...".to_string());
    Action::Interrupt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureEvent;
    use crate::config::{ConfigFile, SessionConfig};
    use std::path::PathBuf;

    fn session() -> Session {
        let config = SessionConfig::resolve(&ConfigFile::default(), None).unwrap();
        Session::new(config, None, PathBuf::from("/tmp/unused.log"))
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_quit_while_running_requests_interrupt() {
        let mut s = session();
        let action = handle_key(&mut s, key(KeyCode::Char('q')), 10);
        assert_eq!(action, Action::Interrupt);
        assert!(!s.should_quit);
    }

    #[test]
    fn test_quit_after_termination_exits() {
        let mut s = session();
        s.handle_event(CaptureEvent::Exited {
            code: Some(0),
            interrupted: false,
        });
        let action = handle_key(&mut s, key(KeyCode::Char('q')), 10);
        assert_eq!(action, Action::None);
        assert!(s.should_quit);
    }

    #[test]
    fn test_ctrl_c_interrupts_while_running() {
        let mut s = session();
        let event = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(handle_key(&mut s, event, 10), Action::Interrupt);
    }

    #[test]
    fn test_help_overlay_swallows_navigation() {
        let mut s = session();
        s.show_help = true;
        assert_eq!(handle_key(&mut s, key(KeyCode::Char('j')), 10), Action::None);
        assert!(s.show_help);
        handle_key(&mut s, key(KeyCode::Esc), 10);
        assert!(!s.show_help);
    }
}
