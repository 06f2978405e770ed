use time::OffsetDateTime;

/// A row of the primary `posts` table, read with `include_hidden = true` so
/// the sync layer sees authoritative state rather than a business-filtered
/// view.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Post {
	pub id: String,
	pub thread_id: String,
	pub title: String,
	pub body: String,
	pub category: String,
	pub author: String,
	pub content: Option<String>,
	pub deleted: bool,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeAction {
	Insert,
	Update,
	Delete,
}
impl ChangeAction {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Insert => "INSERT",
			Self::Update => "UPDATE",
			Self::Delete => "DELETE",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_uppercase().as_str() {
			"INSERT" => Some(Self::Insert),
			"UPDATE" => Some(Self::Update),
			"DELETE" => Some(Self::Delete),
			_ => None,
		}
	}
}

/// A row of the durable change queue. `retries`/`last_error` are the only
/// fields this system ever updates in place.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
	pub id: i64,
	pub entity_id: String,
	pub action: ChangeAction,
	pub retries: i32,
	pub last_error: Option<String>,
	pub created_at: OffsetDateTime,
}

/// The projection of a post as stored in the search index. Always built from
/// a fresh read of the primary row, never from an event payload.
#[derive(Clone, Debug)]
pub struct PostDocument {
	pub id: String,
	pub thread_id: String,
	pub title: String,
	pub body: String,
	pub category: String,
	pub author: String,
	pub content: Option<String>,
	pub deleted: bool,
	pub updated_at: OffsetDateTime,
}
impl PostDocument {
	/// The text the index scores against.
	pub fn search_text(&self) -> String {
		let mut out = String::with_capacity(
			self.title.len()
				+ self.body.len() + self.content.as_deref().map(str::len).unwrap_or(0)
				+ 2,
		);

		out.push_str(&self.title);
		out.push('\n');
		out.push_str(&self.body);

		if let Some(content) = self.content.as_deref() {
			out.push('\n');
			out.push_str(content);
		}

		out
	}
}
