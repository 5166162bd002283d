use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crate::app::{App, InputMode, Screen};
use crate::tui::AppEvent;

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Paste(text) => handle_paste(app, &text).await,
        AppEvent::Resize => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
    }
    app.poll_query_task().await;
    app.poll_refresh_task().await;
    Ok(())
}

async fn handle_paste(app: &mut App, text: &str) {
    if app.show_attach_prompt {
        app.attach_input.push_str(text.trim());
        return;
    }

    match (app.screen, app.input_mode) {
        (Screen::Chat, _) => {
            if !app.handle_drop(text).await && app.input_mode == InputMode::Editing {
                app.insert_draft_text(text);
            }
        }
        (Screen::Host, InputMode::Editing) => app.host_input.push_str(text.trim()),
        _ => {}
    }
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }
    if key.code == KeyCode::Tab && !app.show_attach_prompt {
        app.switch_screen(app.screen.next());
        return Ok(());
    }

    if app.show_attach_prompt {
        handle_attach_prompt(app, key).await;
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key).await,
        InputMode::Editing => handle_editing_mode(app, key).await,
    }

    Ok(())
}

async fn handle_attach_prompt(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_attach_prompt = false;
            app.attach_input.clear();
        }
        KeyCode::Enter => app.confirm_attach_prompt().await,
        KeyCode::Backspace => {
            app.attach_input.pop();
        }
        KeyCode::Char(c) => app.attach_input.push(c),
        _ => {}
    }
}

async fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('1') => app.switch_screen(Screen::Chat),
        KeyCode::Char('2') => app.switch_screen(Screen::Models),
        KeyCode::Char('3') => app.switch_screen(Screen::Host),
        _ => match app.screen {
            Screen::Chat => handle_chat_normal(app, key),
            Screen::Models => handle_models_normal(app, key).await,
            Screen::Host => {
                if matches!(key.code, KeyCode::Char('i') | KeyCode::Enter) {
                    app.input_mode = InputMode::Editing;
                }
            }
        },
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('i') | KeyCode::Enter => app.input_mode = InputMode::Editing,
        KeyCode::Char('a') => app.show_attach_prompt = true,
        KeyCode::Char('x') => app.session.clear_image(),
        KeyCode::Char('j') | KeyCode::Down => app.scroll_chat(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_chat(-1),
        KeyCode::PageDown => app.scroll_chat(page_step(app.chat_height)),
        KeyCode::PageUp => app.scroll_chat(-page_step(app.chat_height)),
        _ => {}
    }
}

fn page_step(height: u16) -> i16 {
    i16::try_from(height).unwrap_or(i16::MAX)
}

async fn handle_models_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.model_nav(1),
        KeyCode::Char('k') | KeyCode::Up => app.model_nav(-1),
        KeyCode::Enter => app.choose_highlighted_model(),
        KeyCode::Char('r') => app.refresh_models(None),
        _ => {}
    }
}

async fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match app.screen {
        Screen::Chat => handle_chat_editing(app, key),
        Screen::Host => handle_host_editing(app, key).await,
        Screen::Models => app.input_mode = InputMode::Normal,
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => app.submit_draft(),
        KeyCode::Char('o') if ctrl => app.show_attach_prompt = true,
        KeyCode::Char('x') if ctrl => app.session.clear_image(),
        KeyCode::Backspace => app.delete_draft_char_before_cursor(),
        KeyCode::Delete => app.delete_draft_char_at_cursor(),
        KeyCode::Left => app.move_draft_cursor(-1),
        KeyCode::Right => app.move_draft_cursor(1),
        KeyCode::Home => app.draft_cursor = 0,
        KeyCode::End => app.draft_cursor = app.session.draft_text().chars().count(),
        KeyCode::Char(c) if !ctrl => {
            let mut buf = [0u8; 4];
            app.insert_draft_text(c.encode_utf8(&mut buf));
        }
        _ => {}
    }
}

async fn handle_host_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => match app.test_host_input() {
            Some(host) => app.refresh_models(Some(host)),
            None => app.set_status("Type a host address first"),
        },
        KeyCode::Backspace => {
            app.host_input.pop();
        }
        KeyCode::Char(c) => app.host_input.push(c),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use talkama_core::Config;
    use tokio::net::TcpListener;

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[tokio::test]
    async fn test_tab_cycles_screens_and_modes() {
        let mut app = App::new(&Config::new());
        assert_eq!(app.screen, Screen::Chat);
        assert_eq!(app.input_mode, InputMode::Editing);

        handle_event(&mut app, key(KeyCode::Tab)).await.unwrap();
        assert_eq!(app.screen, Screen::Models);
        assert_eq!(app.input_mode, InputMode::Normal);

        handle_event(&mut app, key(KeyCode::Tab)).await.unwrap();
        assert_eq!(app.screen, Screen::Host);
    }

    #[tokio::test]
    async fn test_typing_and_enter_with_blank_draft() {
        let mut app = App::new(&Config::new());
        handle_event(&mut app, key(KeyCode::Char(' '))).await.unwrap();
        handle_event(&mut app, key(KeyCode::Enter)).await.unwrap();
        assert!(app.session.log().is_empty());
        assert!(app.query_task.is_none());

        handle_event(&mut app, key(KeyCode::Char('é'))).await.unwrap();
        handle_event(&mut app, key(KeyCode::Left)).await.unwrap();
        handle_event(&mut app, key(KeyCode::Backspace)).await.unwrap();
        assert_eq!(app.session.draft_text(), "é");
    }

    #[tokio::test]
    async fn test_paste_text_goes_into_draft() {
        let mut app = App::new(&Config::new());
        handle_event(&mut app, AppEvent::Paste("hello world".to_string())).await.unwrap();
        assert_eq!(app.session.draft_text(), "hello world");
        assert_eq!(app.draft_cursor, 11);
    }

    #[tokio::test]
    async fn test_attach_prompt_escape() {
        let mut app = App::new(&Config::new());
        app.input_mode = InputMode::Normal;
        handle_event(&mut app, key(KeyCode::Char('a'))).await.unwrap();
        assert!(app.show_attach_prompt);

        handle_event(&mut app, key(KeyCode::Char('/'))).await.unwrap();
        handle_event(&mut app, key(KeyCode::Esc)).await.unwrap();
        assert!(!app.show_attach_prompt);
        assert!(app.attach_input.is_empty());
        assert!(app.session.draft_image().is_none());
    }

    #[test]
    fn test_page_step_saturates() {
        assert_eq!(page_step(24), 24);
        assert_eq!(page_step(u16::MAX), i16::MAX);
        assert_eq!(-page_step(u16::MAX), -i16::MAX);
    }

    #[tokio::test]
    async fn test_host_confirm_does_not_block_on_silent_host() {
        // Bound but never accepted: connects, then no answer ever arrives
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());

        let mut app = App::new(&Config::new());
        app.list_timeout = Duration::from_millis(50);
        app.switch_screen(Screen::Host);
        app.host_input = host;

        tokio::time::timeout(Duration::from_secs(1), handle_event(&mut app, key(KeyCode::Enter)))
            .await
            .expect("handle_event waited on the host")
            .unwrap();
        assert!(app.refresh_task.is_some());

        // The UI keeps taking input while the listing is pending
        handle_event(&mut app, key(KeyCode::Char('x'))).await.unwrap();
        assert!(app.host_input.ends_with('x'));

        for _ in 0..100 {
            if app.refresh_task.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle_event(&mut app, AppEvent::Tick).await.unwrap();
        }
        assert!(app.refresh_task.is_none());
        assert!(app.status.as_deref().unwrap().starts_with("Error fetching models"));
        drop(listener);
    }
}
