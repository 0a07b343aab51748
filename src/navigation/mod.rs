pub mod config;

use std::sync::Arc;

use tracing::{debug, info};

use crate::app::Result;
use crate::domain::{Course, CourseMenu};
use crate::parser::html::resolve_link;
use crate::parser::ParserSet;
use crate::portal::{Document, Method};
use crate::session::{RoomCache, Session};

pub use config::{EntryMethod, NavigationConfig};

/// Finds courses and per-course content menus inside an authenticated session.
pub struct NavigationResolver {
    config: NavigationConfig,
    parsers: Arc<ParserSet>,
}

impl NavigationResolver {
    pub fn new(config: NavigationConfig, parsers: Arc<ParserSet>) -> Self {
        Self { config, parsers }
    }

    /// Courses listed for the session's user. An empty page is an empty list.
    pub async fn list_courses(&self, session: &Session) -> Result<Vec<Course>> {
        let doc = session.get(&self.config.courses_path, None).await?;
        let courses = self.parsers.courses().parse_courses(&doc.text())?;
        debug!(user_id = session.user_id(), count = courses.len(), "course list parsed");
        Ok(courses)
    }

    /// The course's content-type menu. The room is entered at most once per
    /// session; the menu is cached on the session afterwards.
    pub async fn discover_menus(&self, session: &Session, course_id: &str) -> Result<CourseMenu> {
        let mut rooms = session.rooms().await;
        if let Some(menu) = rooms.menu(course_id) {
            return Ok(menu.clone());
        }

        let landing = self.landing_page(session, &mut rooms, course_id).await?;
        let entries = self
            .parsers
            .menus()
            .parse_menus(&landing.text())?
            .into_iter()
            .map(|(ct, href)| (ct, resolve_link(&landing.url, &href)))
            .collect();

        let menu = CourseMenu::new(course_id, entries);
        if menu.is_empty() {
            info!(course_id, "course room has no recognizable menu");
        } else {
            debug!(course_id, entries = menu.entries.len(), "course menu discovered");
        }
        rooms.store_menu(menu.clone());
        Ok(menu)
    }

    async fn landing_page(
        &self,
        session: &Session,
        rooms: &mut RoomCache,
        course_id: &str,
    ) -> Result<Document> {
        let entry = if rooms.has_entered(course_id) {
            None
        } else {
            let doc = self.enter_room(session, course_id).await?;
            rooms.mark_entered(course_id);
            Some(doc)
        };

        match (self.config.room_home_url(course_id), entry) {
            (Some(home), entry) => {
                let referer = entry.as_ref().map(|d| d.url.as_str());
                session.get(&home, referer).await
            }
            (None, Some(entry)) => Ok(entry),
            // Entered earlier but the menu was never parsed: the entry page is the landing page.
            (None, None) => session.get(&self.config.room_entry_url(course_id), None).await,
        }
    }

    async fn enter_room(&self, session: &Session, course_id: &str) -> Result<Document> {
        let url = self.config.room_entry_url(course_id);
        let method: Method = self.config.room_entry_method.into();
        let params: Vec<(&str, &str)> = self
            .config
            .room_entry_param
            .as_deref()
            .map(|name| vec![(name, course_id)])
            .unwrap_or_default();

        debug!(course_id, %method, url = %url, "entering course room");
        session.request(method, &url, &params, None).await
    }
}
