use crate::helper::sanitization_helpers::{derive_excerpt, slugify};
use crate::models::db_operations::{append_limit_offset, map_unique_violation, parse_timestamp, DbError};
use crate::models::Post;
use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::Serialize;

const POST_COLUMNS: &str = "p.id, p.title, p.content, p.slug, p.excerpt, p.tags, p.author_id, \
     u.email, p.is_published, p.featured_image, p.created_at, p.updated_at";

const POST_FROM: &str = "FROM posts p JOIN users u ON u.id = p.author_id";

fn row_to_post(row: &Row) -> rusqlite::Result<Post> {
    let tags_json: String = row.get(5)?;
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        slug: row.get(3)?,
        excerpt: row.get(4)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        author_id: row.get(6)?,
        author_email: row.get(7)?,
        is_published: row.get(8)?,
        featured_image: row.get(9)?,
        created_at: parse_timestamp(row.get(10)?, 10)?,
        updated_at: parse_timestamp(row.get(11)?, 11)?,
    })
}

#[derive(Debug, Clone)]
pub struct PostInput {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub is_published: bool,
    pub featured_image: Option<String>,
}

impl PostInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Title must not be blank.".to_string());
        }
        if slugify(&self.title).is_empty() {
            return Err("Title must contain at least one letter or digit.".to_string());
        }
        if self.content.trim().is_empty() {
            return Err("Content must not be blank.".to_string());
        }
        Ok(())
    }
}

/// All criteria combine with AND.
#[derive(Debug, Default, Clone)]
pub struct PostFilter {
    pub published_only: bool,
    pub author_id: Option<i64>,
    /// Exact tag match against the stored tag list.
    pub tag: Option<String>,
    /// Substring match on title OR content OR excerpt.
    pub search: Option<String>,
}

fn build_where(filter: &PostFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if filter.published_only {
        clauses.push("p.is_published = 1".to_string());
    }
    if let Some(author_id) = filter.author_id {
        values.push(Box::new(author_id));
        clauses.push(format!("p.author_id = ?{}", values.len()));
    }
    if let Some(tag) = &filter.tag {
        values.push(Box::new(tag.clone()));
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM json_each(p.tags) WHERE json_each.value = ?{})",
            values.len()
        ));
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", search);
        values.push(Box::new(pattern.clone()));
        let first = values.len();
        values.push(Box::new(pattern.clone()));
        let second = values.len();
        values.push(Box::new(pattern));
        clauses.push(format!(
            "(p.title LIKE ?{} OR p.content LIKE ?{} OR p.excerpt LIKE ?{})",
            first,
            second,
            values.len()
        ));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

pub fn count_with_filters(conn: &Connection, filter: &PostFilter) -> Result<i64, DbError> {
    let (where_sql, values) = build_where(filter);
    let sql = format!("SELECT COUNT(*) {}{}", POST_FROM, where_sql);
    let count = conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
    Ok(count)
}

/// No limit means the full filtered set.
pub fn find_with_filters(
    conn: &Connection,
    filter: &PostFilter,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<Vec<Post>, DbError> {
    let (where_sql, mut values) = build_where(filter);
    let mut sql = format!(
        "SELECT {} {}{} ORDER BY p.created_at DESC, p.id ASC",
        POST_COLUMNS, POST_FROM, where_sql
    );
    append_limit_offset(&mut sql, &mut values, limit, offset);
    let mut stmt = conn.prepare(&sql)?;
    let posts = stmt
        .query_map(params_from_iter(values.iter()), row_to_post)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(posts)
}

#[derive(Debug, Serialize)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

pub fn find_page(
    conn: &Connection,
    filter: &PostFilter,
    page: i64,
    limit: i64,
) -> Result<PostPage, DbError> {
    let page = page.max(1);
    let total = count_with_filters(conn, filter)?;
    let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
    let posts = find_with_filters(conn, filter, Some(limit), Some((page - 1) * limit))?;
    Ok(PostPage {
        posts,
        total,
        page,
        limit,
        total_pages,
    })
}

pub fn read_post(conn: &Connection, post_id: i64) -> Option<Post> {
    conn.query_row(
        &format!("SELECT {} {} WHERE p.id = ?1", POST_COLUMNS, POST_FROM),
        [post_id],
        row_to_post,
    )
    .ok()
}

/// Public lookup: only published posts resolve by slug.
pub fn find_published_by_slug(conn: &Connection, slug: &str) -> Option<Post> {
    conn.query_row(
        &format!(
            "SELECT {} {} WHERE p.slug = ?1 AND p.is_published = 1",
            POST_COLUMNS, POST_FROM
        ),
        [slug],
        row_to_post,
    )
    .ok()
}

pub fn find_recent(conn: &Connection, limit: i64) -> Result<Vec<Post>, DbError> {
    let filter = PostFilter {
        published_only: true,
        ..Default::default()
    };
    find_with_filters(conn, &filter, Some(limit), None)
}

/// Slug and excerpt are derived from title and content at write time.
/// A duplicate slug is `DbError::Conflict("slug")`.
pub fn create_post(conn: &Connection, input: &PostInput, author_id: i64) -> Result<i64, DbError> {
    let slug = slugify(&input.title);
    let excerpt = derive_excerpt(&input.content);
    let tags_json = serde_json::to_string(&input.tags)?;
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO posts (title, content, slug, excerpt, tags, author_id, is_published,
                featured_image, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            input.title.trim(),
            input.content,
            slug,
            excerpt,
            tags_json,
            author_id,
            input.is_published,
            input.featured_image,
            now
        ],
    )
    .map_err(|e| map_unique_violation(e, "slug"))?;
    Ok(conn.last_insert_rowid())
}

pub fn update_post(conn: &Connection, post_id: i64, input: &PostInput) -> Result<(), DbError> {
    let slug = slugify(&input.title);
    let excerpt = derive_excerpt(&input.content);
    let tags_json = serde_json::to_string(&input.tags)?;
    let now = Utc::now().to_rfc3339();
    let changed = conn
        .execute(
            "UPDATE posts SET title = ?1, content = ?2, slug = ?3, excerpt = ?4, tags = ?5,
                is_published = ?6, featured_image = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                input.title.trim(),
                input.content,
                slug,
                excerpt,
                tags_json,
                input.is_published,
                input.featured_image,
                now,
                post_id
            ],
        )
        .map_err(|e| map_unique_violation(e, "slug"))?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("post {}", post_id)));
    }
    Ok(())
}

pub fn set_published(conn: &Connection, post_id: i64, published: bool) -> Result<(), DbError> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE posts SET is_published = ?1, updated_at = ?2 WHERE id = ?3",
        params![published, now, post_id],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("post {}", post_id)));
    }
    Ok(())
}

/// Comments go with the post via ON DELETE CASCADE.
pub fn delete_post(conn: &Connection, post_id: i64) -> Result<(), DbError> {
    let changed = conn.execute("DELETE FROM posts WHERE id = ?1", [post_id])?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("post {}", post_id)));
    }
    Ok(())
}

/// Distinct tags across published posts, alphabetically.
pub fn all_tags(conn: &Connection) -> Result<Vec<String>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT json_each.value FROM posts p, json_each(p.tags)
         WHERE p.is_published = 1 ORDER BY json_each.value ASC",
    )?;
    let tags = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::users_db_operations::create_user;
    use crate::setup::db_setup::in_memory_db;

    fn seed_author(conn: &Connection) -> i64 {
        create_user(conn, "author@example.com", "secret123", &[]).unwrap()
    }

    fn sample_input(title: &str) -> PostInput {
        PostInput {
            title: title.to_string(),
            content: "<p>Some <b>rich</b> content about Rust.</p>".to_string(),
            tags: vec!["rust".to_string(), "web".to_string()],
            is_published: true,
            featured_image: None,
        }
    }

    #[test]
    fn slug_and_excerpt_are_derived_on_create() {
        let conn = in_memory_db();
        let author = seed_author(&conn);
        let id = create_post(&conn, &sample_input("Hello, World!!"), author).unwrap();

        let post = read_post(&conn, id).expect("post exists");
        assert_eq!(post.slug, "hello-world");
        assert_eq!(post.excerpt.as_deref(), Some("Some rich content about Rust."));
        assert_eq!(post.author_email, "author@example.com");
        assert_eq!(post.tags, vec!["rust", "web"]);
    }

    #[test]
    fn duplicate_slug_is_a_named_conflict() {
        let conn = in_memory_db();
        let author = seed_author(&conn);
        create_post(&conn, &sample_input("Hello World"), author).unwrap();
        let err = create_post(&conn, &sample_input("hello... world"), author).unwrap_err();
        assert!(matches!(err, DbError::Conflict(ref what) if what == "slug"));
    }

    #[test]
    fn slug_lookup_ignores_drafts() {
        let conn = in_memory_db();
        let author = seed_author(&conn);
        let mut draft = sample_input("Work in progress");
        draft.is_published = false;
        let id = create_post(&conn, &draft, author).unwrap();

        assert!(find_published_by_slug(&conn, "work-in-progress").is_none());
        set_published(&conn, id, true).unwrap();
        assert!(find_published_by_slug(&conn, "work-in-progress").is_some());
    }

    #[test]
    fn filters_match_tags_and_search_text() {
        let conn = in_memory_db();
        let author = seed_author(&conn);

        create_post(&conn, &sample_input("Rust pools"), author).unwrap();
        let mut other = sample_input("Gardening notes");
        other.content = "<p>Tomatoes and soil.</p>".to_string();
        other.tags = vec!["garden".to_string()];
        create_post(&conn, &other, author).unwrap();

        let by_tag = PostFilter {
            published_only: true,
            tag: Some("garden".to_string()),
            ..Default::default()
        };
        let posts = find_with_filters(&conn, &by_tag, None, None).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Gardening notes");

        let by_search = PostFilter {
            published_only: true,
            search: Some("tomatoes".to_string()),
            ..Default::default()
        };
        assert_eq!(count_with_filters(&conn, &by_search).unwrap(), 1);

        let combined = PostFilter {
            published_only: true,
            tag: Some("garden".to_string()),
            search: Some("rust".to_string()),
            ..Default::default()
        };
        assert_eq!(count_with_filters(&conn, &combined).unwrap(), 0);
    }

    #[test]
    fn update_recomputes_slug_and_excerpt() {
        let conn = in_memory_db();
        let author = seed_author(&conn);
        let id = create_post(&conn, &sample_input("First title"), author).unwrap();

        let mut input = sample_input("Second Title");
        input.content = "<p>New body.</p>".to_string();
        update_post(&conn, id, &input).unwrap();

        let post = read_post(&conn, id).unwrap();
        assert_eq!(post.slug, "second-title");
        assert_eq!(post.excerpt.as_deref(), Some("New body."));
    }

    #[test]
    fn tag_listing_covers_published_posts_only() {
        let conn = in_memory_db();
        let author = seed_author(&conn);
        create_post(&conn, &sample_input("Visible"), author).unwrap();
        let mut draft = sample_input("Hidden");
        draft.is_published = false;
        draft.tags = vec!["secret".to_string()];
        create_post(&conn, &draft, author).unwrap();

        let tags = all_tags(&conn).unwrap();
        assert_eq!(tags, vec!["rust", "web"]);
    }
}
