use crate::models::db_operations::{parse_timestamp, DbError};
use crate::models::Comment;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

const COMMENT_COLUMNS: &str = "c.id, c.post_id, c.author_id, u.email, c.parent_id, c.content, \
     c.is_hidden, c.created_at, c.updated_at";

const COMMENT_FROM: &str = "FROM comments c JOIN users u ON u.id = c.author_id";

fn row_to_comment(row: &Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        author_email: row.get(3)?,
        parent_id: row.get(4)?,
        content: row.get(5)?,
        is_hidden: row.get(6)?,
        created_at: parse_timestamp(row.get(7)?, 7)?,
        updated_at: parse_timestamp(row.get(8)?, 8)?,
    })
}

/// A reply must point at a comment under the same post.
pub fn create_comment(
    conn: &Connection,
    post_id: i64,
    author_id: i64,
    parent_id: Option<i64>,
    content: &str,
) -> Result<i64, DbError> {
    if let Some(parent) = parent_id {
        let parent_post: Option<i64> = conn
            .query_row(
                "SELECT post_id FROM comments WHERE id = ?1",
                [parent],
                |row| row.get(0),
            )
            .optional()?;
        match parent_post {
            Some(p) if p == post_id => {}
            _ => return Err(DbError::NotFound(format!("parent comment {}", parent))),
        }
    }
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO comments (post_id, author_id, parent_id, content, is_hidden, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
        params![post_id, author_id, parent_id, content, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_comment(conn: &Connection, comment_id: i64) -> Option<Comment> {
    conn.query_row(
        &format!("SELECT {} {} WHERE c.id = ?1", COMMENT_COLUMNS, COMMENT_FROM),
        [comment_id],
        row_to_comment,
    )
    .ok()
}

/// Comments in posting order. Hidden ones are kept for moderators only.
pub fn find_for_post(
    conn: &Connection,
    post_id: i64,
    include_hidden: bool,
) -> Result<Vec<Comment>, DbError> {
    let hidden_sql = if include_hidden { "" } else { " AND c.is_hidden = 0" };
    let sql = format!(
        "SELECT {} {} WHERE c.post_id = ?1{} ORDER BY c.created_at ASC, c.id ASC",
        COMMENT_COLUMNS, COMMENT_FROM, hidden_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let comments = stmt
        .query_map([post_id], row_to_comment)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(comments)
}

pub fn update_content(conn: &Connection, comment_id: i64, content: &str) -> Result<(), DbError> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE comments SET content = ?1, updated_at = ?2 WHERE id = ?3",
        params![content, now, comment_id],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("comment {}", comment_id)));
    }
    Ok(())
}

pub fn set_hidden(conn: &Connection, comment_id: i64, hidden: bool) -> Result<(), DbError> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE comments SET is_hidden = ?1, updated_at = ?2 WHERE id = ?3",
        params![hidden, now, comment_id],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("comment {}", comment_id)));
    }
    Ok(())
}

/// Replies go with their parent via ON DELETE CASCADE.
pub fn delete_comment(conn: &Connection, comment_id: i64) -> Result<(), DbError> {
    let changed = conn.execute("DELETE FROM comments WHERE id = ?1", [comment_id])?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("comment {}", comment_id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::posts_db_operations::{create_post, PostInput};
    use crate::models::db_operations::users_db_operations::create_user;
    use crate::setup::db_setup::in_memory_db;

    fn seed_post(conn: &Connection) -> (i64, i64) {
        let author = create_user(conn, "author@example.com", "secret123", &[]).unwrap();
        let input = PostInput {
            title: "A post".to_string(),
            content: "Body".to_string(),
            tags: vec![],
            is_published: true,
            featured_image: None,
        };
        let post_id = create_post(conn, &input, author).unwrap();
        (post_id, author)
    }

    #[test]
    fn threaded_comments_stay_on_one_post() {
        let conn = in_memory_db();
        let (post_id, author) = seed_post(&conn);
        let root = create_comment(&conn, post_id, author, None, "First!").unwrap();
        let reply = create_comment(&conn, post_id, author, Some(root), "Welcome").unwrap();

        let comments = find_for_post(&conn, post_id, false).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].id, root);
        assert_eq!(comments[1].parent_id, Some(root));

        // A reply may not reference a comment under another post.
        let other_input = PostInput {
            title: "Another post".to_string(),
            content: "Body".to_string(),
            tags: vec![],
            is_published: true,
            featured_image: None,
        };
        let other_post = create_post(&conn, &other_input, author).unwrap();
        let err = create_comment(&conn, other_post, author, Some(reply), "Wrong thread")
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn hidden_comments_are_filtered_for_readers() {
        let conn = in_memory_db();
        let (post_id, author) = seed_post(&conn);
        let visible = create_comment(&conn, post_id, author, None, "Fine").unwrap();
        let nasty = create_comment(&conn, post_id, author, None, "Spam").unwrap();
        set_hidden(&conn, nasty, true).unwrap();

        let public = find_for_post(&conn, post_id, false).unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].id, visible);

        let moderation = find_for_post(&conn, post_id, true).unwrap();
        assert_eq!(moderation.len(), 2);
        assert!(moderation.iter().any(|c| c.is_hidden));
    }

    #[test]
    fn deleting_a_parent_removes_replies() {
        let conn = in_memory_db();
        let (post_id, author) = seed_post(&conn);
        let root = create_comment(&conn, post_id, author, None, "Root").unwrap();
        create_comment(&conn, post_id, author, Some(root), "Reply").unwrap();

        delete_comment(&conn, root).unwrap();
        assert!(find_for_post(&conn, post_id, true).unwrap().is_empty());
    }
}
