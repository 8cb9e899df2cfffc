//! RSS 2.0 podcast feed with the iTunes extension.

use anyhow::Result;
use chrono::NaiveDate;
use obsede_core::episode::{Episode, FeedRenderer};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io;
use tracing::warn;

pub const FEED_TITLE: &str = "L'Obsédé - Daily French Drill";
pub const FEED_DESCRIPTION: &str = "Automated French learning: Literature, Philosophy, Math, and Physics.";
const FEED_AUTHOR: &str = "The Machine";
const ITUNES_NS: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";
const DEFAULT_ITEM_DESCRIPTION: &str = "Daily French Drill.";

/// Hour of day (UTC) stamped on every episode's `pubDate`.
const PUBLISH_HOUR: u32 = 6;

/// Enclosure MIME type from the URL's file extension, ignoring any query string.
pub fn enclosure_mime(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        _ => "audio/mpeg",
    }
}

/// RFC 2822 publication timestamp for an episode date.
pub fn pub_date(date: NaiveDate) -> Option<String> {
    date.and_hms_opt(PUBLISH_HOUR, 0, 0)
        .map(|dt| dt.and_utc().to_rfc2822())
}

fn text_element<W: io::Write>(writer: &mut Writer<W>, name: &str, text: &str) -> io::Result<()> {
    writer
        .create_element(name)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

pub struct RssFeed {
    site_url: String,
}

impl RssFeed {
    pub fn new(site_url: impl Into<String>) -> Self {
        Self {
            site_url: site_url.into(),
        }
    }

    fn write_channel<W: io::Write>(&self, writer: &mut Writer<W>, episodes: &[Episode]) -> io::Result<()> {
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(
            BytesStart::new("rss").with_attributes([("version", "2.0"), ("xmlns:itunes", ITUNES_NS)]),
        ))?;
        writer.write_event(Event::Start(BytesStart::new("channel")))?;

        text_element(writer, "title", FEED_TITLE)?;
        text_element(writer, "link", &self.site_url)?;
        text_element(writer, "description", FEED_DESCRIPTION)?;
        text_element(writer, "language", "fr")?;
        text_element(writer, "itunes:author", FEED_AUTHOR)?;
        text_element(writer, "itunes:explicit", "no")?;
        writer.write_event(Event::Start(
            BytesStart::new("itunes:category").with_attributes([("text", "Education")]),
        ))?;
        writer.write_event(Event::Empty(
            BytesStart::new("itunes:category").with_attributes([("text", "Language Courses")]),
        ))?;
        writer.write_event(Event::End(BytesEnd::new("itunes:category")))?;

        for episode in episodes {
            let Some(published) = NaiveDate::parse_from_str(&episode.date, "%Y-%m-%d")
                .ok()
                .and_then(pub_date)
            else {
                warn!(date = %episode.date, "Skipping feed item with an unparsable date");
                continue;
            };
            self.write_item(writer, episode, &published)?;
        }

        writer.write_event(Event::End(BytesEnd::new("channel")))?;
        writer.write_event(Event::End(BytesEnd::new("rss")))?;
        Ok(())
    }

    fn write_item<W: io::Write>(&self, writer: &mut Writer<W>, episode: &Episode, published: &str) -> io::Result<()> {
        let description = if episode.description.trim().is_empty() {
            DEFAULT_ITEM_DESCRIPTION
        } else {
            episode.description.as_str()
        };
        let length = episode.file_size.to_string();

        writer.write_event(Event::Start(BytesStart::new("item")))?;
        text_element(writer, "title", &format!("Drill: {} - {}", episode.date, episode.listening_topic))?;
        text_element(writer, "link", &episode.audio_url)?;
        text_element(writer, "description", description)?;
        writer
            .create_element("guid")
            .with_attribute(("isPermaLink", "false"))
            .write_text_content(BytesText::new(&format!("daily-drill-{}", episode.date)))?;
        text_element(writer, "pubDate", published)?;
        writer.write_event(Event::Empty(BytesStart::new("enclosure").with_attributes([
            ("url", episode.audio_url.as_str()),
            ("length", length.as_str()),
            ("type", enclosure_mime(&episode.audio_url)),
        ])))?;
        writer.write_event(Event::End(BytesEnd::new("item")))?;
        Ok(())
    }
}

impl FeedRenderer for RssFeed {
    fn render(&self, episodes: &[Episode]) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        self.write_channel(&mut writer, episodes)?;
        Ok(String::from_utf8(writer.into_inner())?)
    }
}
