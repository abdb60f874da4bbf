use crate::helper::log_helpers;
use crate::helper::sanitization_helpers::normalize_tags;
use crate::middleware::{request_metadata, AuthenticatedUser};
use crate::models::db_operations::comments_db_operations;
use crate::models::db_operations::posts_db_operations::{self, PostFilter, PostInput};
use crate::models::db_operations::DbError;
use crate::models::LogEventType;
use crate::routes::{redirect, render, set_notification, take_notification};
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_session::Session;
use actix_web::{web, HttpRequest, Responder};
use serde::Deserialize;
use tera::{Context, Tera};

const PAGE_SIZE: i64 = 10;

#[derive(Deserialize)]
pub struct PostListQuery {
    tag: Option<String>,
    q: Option<String>,
    page: Option<i64>,
}

#[derive(Deserialize)]
struct PostForm {
    csrf_token: CsrfToken,
    title: String,
    content: String,
    tags: Option<String>,
    is_published: Option<String>,
    featured_image: Option<String>,
}

impl CsrfGuarded for PostForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct CommentForm {
    csrf_token: CsrfToken,
    content: String,
    parent_id: Option<String>,
}

impl CsrfGuarded for CommentForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct CommentEditForm {
    csrf_token: CsrfToken,
    content: String,
}

impl CsrfGuarded for CommentEditForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct ActionForm {
    csrf_token: CsrfToken,
}

impl CsrfGuarded for ActionForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

pub fn config_posts(cfg: &mut web::ServiceConfig) {
    cfg.route("/posts", web::get().to(list_posts))
        .route("/posts/new", web::get().to(show_new_form))
        .route("/posts", web::post().to(handle_create))
        .route("/posts/{slug}", web::get().to(show_post))
        .route("/posts/{id}/edit", web::get().to(show_edit_form))
        .route("/posts/{id}", web::post().to(handle_update))
        .route("/posts/{id}/publish", web::post().to(handle_publish))
        .route("/posts/{id}/delete", web::post().to(handle_delete))
        .route("/posts/{id}/comments", web::post().to(handle_comment_create))
        .route("/comments/{id}/edit", web::post().to(handle_comment_edit))
        .route("/comments/{id}/hide", web::post().to(handle_comment_hide))
        .route("/comments/{id}/delete", web::post().to(handle_comment_delete));
}

fn input_from_form(form: &PostForm) -> Result<PostInput, String> {
    let input = PostInput {
        title: form.title.trim().to_string(),
        content: form.content.clone(),
        tags: form.tags.as_deref().map(normalize_tags).unwrap_or_default(),
        is_published: matches!(form.is_published.as_deref(), Some("on") | Some("true") | Some("1")),
        featured_image: form
            .featured_image
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    };
    input.validate()?;
    Ok(input)
}

fn may_moderate(user: &AuthenticatedUser, author_id: i64) -> bool {
    user.id == author_id || user.is_admin()
}

async fn list_posts(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<crate::DbPool>,
    query: web::Query<PostListQuery>,
) -> impl Responder {
    let mut ctx = Context::new();
    ctx.insert("posts", &Vec::<crate::models::Post>::new());

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for post list: {}", e);
            return render(&tera, "post/index.html", &ctx);
        }
    };

    let filter = PostFilter {
        published_only: true,
        tag: query.tag.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
        search: query.q.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
        ..Default::default()
    };
    match posts_db_operations::find_page(&conn, &filter, query.page.unwrap_or(1), PAGE_SIZE) {
        Ok(result) => {
            ctx.insert("posts", &result.posts);
            ctx.insert("total", &result.total);
            ctx.insert("page", &result.page);
            ctx.insert("total_pages", &result.total_pages);
        }
        Err(e) => log::error!("Failed to list posts: {}", e),
    }
    match posts_db_operations::all_tags(&conn) {
        Ok(tags) => ctx.insert("available_tags", &tags),
        Err(e) => log::error!("Failed to fetch tag list: {}", e),
    }
    if let Ok(Some(user_id)) = session.get::<i64>("user_id") {
        ctx.insert("user_id", &user_id);
    }
    take_notification(&session, &mut ctx);
    render(&tera, "post/index.html", &ctx)
}

async fn show_post(
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<crate::DbPool>,
    path: web::Path<String>,
    token: CsrfToken,
) -> impl Responder {
    let slug = path.into_inner();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for post '{}': {}", slug, e);
            return redirect("/posts");
        }
    };

    let post = match posts_db_operations::find_published_by_slug(&conn, &slug) {
        Some(post) => post,
        None => {
            set_notification(&session, "This post does not exist.", "error");
            return redirect("/posts");
        }
    };

    let user_id = session.get::<i64>("user_id").unwrap_or(None);
    let roles = session
        .get::<Vec<String>>("user_roles")
        .unwrap_or(None)
        .unwrap_or_default();
    let moderator = user_id.map_or(false, |id| {
        id == post.author_id || roles.iter().any(|r| r == crate::models::ROLE_ADMIN)
    });

    let mut ctx = Context::new();
    match comments_db_operations::find_for_post(&conn, post.id, moderator) {
        Ok(comments) => ctx.insert("comments", &comments),
        Err(e) => {
            log::error!("Failed to load comments for post {}: {}", post.id, e);
            ctx.insert("comments", &Vec::<crate::models::Comment>::new());
        }
    }
    ctx.insert("post", &post);
    ctx.insert("csrf_token", token.get());
    ctx.insert("moderator", &moderator);
    if let Some(id) = user_id {
        ctx.insert("user_id", &id);
    }
    take_notification(&session, &mut ctx);
    render(&tera, "post/show.html", &ctx)
}

async fn show_new_form(
    user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    token: CsrfToken,
) -> impl Responder {
    let mut ctx = Context::new();
    ctx.insert("csrf_token", token.get());
    ctx.insert("user", &user);
    take_notification(&session, &mut ctx);
    render(&tera, "post/form.html", &ctx)
}

async fn handle_create(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    pool: web::Data<crate::DbPool>,
    form: Csrf<web::Form<PostForm>>,
) -> impl Responder {
    let form = form.into_inner();
    let input = match input_from_form(&form) {
        Ok(input) => input,
        Err(message) => {
            set_notification(&session, &message, "error");
            return redirect("/posts/new");
        }
    };

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for post creation: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect("/posts/new");
        }
    };

    match posts_db_operations::create_post(&conn, &input, user.id) {
        Ok(post_id) => {
            log_helpers::record_post_activity(
                &conn,
                LogEventType::PostCreated,
                user.id,
                post_id,
                &input.title,
                &request_metadata(&req),
            );
            set_notification(&session, "Post created.", "success");
            if input.is_published {
                redirect(&format!("/posts/{}", crate::helper::sanitization_helpers::slugify(&input.title)))
            } else {
                redirect(&format!("/posts/{}/edit", post_id))
            }
        }
        Err(DbError::Conflict(_)) => {
            set_notification(&session, "A post with this title already exists. Pick another title.", "error");
            redirect("/posts/new")
        }
        Err(e) => {
            log::error!("Failed to create post: {}", e);
            set_notification(&session, "The post could not be created.", "error");
            redirect("/posts/new")
        }
    }
}

async fn show_edit_form(
    user: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<crate::DbPool>,
    path: web::Path<i64>,
    token: CsrfToken,
) -> impl Responder {
    let post_id = path.into_inner();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for post edit: {}", e);
            return redirect("/posts");
        }
    };

    let post = match posts_db_operations::read_post(&conn, post_id) {
        Some(post) => post,
        None => {
            set_notification(&session, "This post does not exist.", "error");
            return redirect("/posts");
        }
    };
    if !may_moderate(&user, post.author_id) {
        set_notification(&session, "You are not allowed to edit this post.", "error");
        return redirect("/posts");
    }

    let mut ctx = Context::new();
    ctx.insert("csrf_token", token.get());
    ctx.insert("user", &user);
    ctx.insert("post", &post);
    take_notification(&session, &mut ctx);
    render(&tera, "post/form.html", &ctx)
}

async fn handle_update(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    pool: web::Data<crate::DbPool>,
    path: web::Path<i64>,
    form: Csrf<web::Form<PostForm>>,
) -> impl Responder {
    let post_id = path.into_inner();
    let form = form.into_inner();
    let input = match input_from_form(&form) {
        Ok(input) => input,
        Err(message) => {
            set_notification(&session, &message, "error");
            return redirect(&format!("/posts/{}/edit", post_id));
        }
    };

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for post update: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect(&format!("/posts/{}/edit", post_id));
        }
    };

    let post = match posts_db_operations::read_post(&conn, post_id) {
        Some(post) => post,
        None => {
            set_notification(&session, "This post does not exist.", "error");
            return redirect("/posts");
        }
    };
    if !may_moderate(&user, post.author_id) {
        set_notification(&session, "You are not allowed to edit this post.", "error");
        return redirect("/posts");
    }

    match posts_db_operations::update_post(&conn, post_id, &input) {
        Ok(()) => {
            log_helpers::record_post_activity(
                &conn,
                LogEventType::PostUpdated,
                user.id,
                post_id,
                &input.title,
                &request_metadata(&req),
            );
            set_notification(&session, "Post updated.", "success");
            redirect(&format!("/posts/{}/edit", post_id))
        }
        Err(DbError::Conflict(_)) => {
            set_notification(&session, "A post with this title already exists. Pick another title.", "error");
            redirect(&format!("/posts/{}/edit", post_id))
        }
        Err(e) => {
            log::error!("Failed to update post {}: {}", post_id, e);
            set_notification(&session, "The post could not be updated.", "error");
            redirect(&format!("/posts/{}/edit", post_id))
        }
    }
}

async fn handle_publish(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    pool: web::Data<crate::DbPool>,
    path: web::Path<i64>,
    _form: Csrf<web::Form<ActionForm>>,
) -> impl Responder {
    let post_id = path.into_inner();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for publishing: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect("/posts");
        }
    };

    let post = match posts_db_operations::read_post(&conn, post_id) {
        Some(post) => post,
        None => {
            set_notification(&session, "This post does not exist.", "error");
            return redirect("/posts");
        }
    };
    if !may_moderate(&user, post.author_id) {
        set_notification(&session, "You are not allowed to publish this post.", "error");
        return redirect("/posts");
    }

    match posts_db_operations::set_published(&conn, post_id, true) {
        Ok(()) => {
            log_helpers::record_post_activity(
                &conn,
                LogEventType::PostPublished,
                user.id,
                post_id,
                &post.title,
                &request_metadata(&req),
            );
            set_notification(&session, "Post published.", "success");
            redirect(&format!("/posts/{}", post.slug))
        }
        Err(e) => {
            log::error!("Failed to publish post {}: {}", post_id, e);
            set_notification(&session, "The post could not be published.", "error");
            redirect(&format!("/posts/{}/edit", post_id))
        }
    }
}

async fn handle_delete(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    pool: web::Data<crate::DbPool>,
    path: web::Path<i64>,
    _form: Csrf<web::Form<ActionForm>>,
) -> impl Responder {
    let post_id = path.into_inner();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for post deletion: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect("/posts");
        }
    };

    let post = match posts_db_operations::read_post(&conn, post_id) {
        Some(post) => post,
        None => {
            set_notification(&session, "This post does not exist.", "error");
            return redirect("/posts");
        }
    };
    if !may_moderate(&user, post.author_id) {
        set_notification(&session, "You are not allowed to delete this post.", "error");
        return redirect("/posts");
    }

    match posts_db_operations::delete_post(&conn, post_id) {
        Ok(()) => {
            log_helpers::record_post_activity(
                &conn,
                LogEventType::PostDeleted,
                user.id,
                post_id,
                &post.title,
                &request_metadata(&req),
            );
            set_notification(&session, "Post deleted.", "success");
        }
        Err(e) => {
            log::error!("Failed to delete post {}: {}", post_id, e);
            set_notification(&session, "The post could not be deleted.", "error");
        }
    }
    redirect("/posts")
}

async fn handle_comment_create(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    pool: web::Data<crate::DbPool>,
    path: web::Path<i64>,
    form: Csrf<web::Form<CommentForm>>,
) -> impl Responder {
    let post_id = path.into_inner();
    let form = form.into_inner();
    let content = form.content.trim().to_string();

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for commenting: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect("/posts");
        }
    };

    let post = match posts_db_operations::read_post(&conn, post_id) {
        Some(post) if post.is_published => post,
        _ => {
            set_notification(&session, "This post does not exist.", "error");
            return redirect("/posts");
        }
    };

    if content.is_empty() {
        set_notification(&session, "A comment needs some text.", "error");
        return redirect(&format!("/posts/{}", post.slug));
    }

    let parent_id = form
        .parent_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<i64>().ok());

    match comments_db_operations::create_comment(&conn, post_id, user.id, parent_id, &content) {
        Ok(comment_id) => {
            log_helpers::record_comment_activity(
                &conn,
                LogEventType::CommentCreated,
                user.id,
                comment_id,
                post_id,
                &request_metadata(&req),
            );
            set_notification(&session, "Comment added.", "success");
        }
        Err(DbError::NotFound(_)) => {
            set_notification(&session, "The comment you replied to no longer exists.", "error");
        }
        Err(e) => {
            log::error!("Failed to add comment to post {}: {}", post_id, e);
            set_notification(&session, "The comment could not be added.", "error");
        }
    }
    redirect(&format!("/posts/{}", post.slug))
}

async fn handle_comment_edit(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    pool: web::Data<crate::DbPool>,
    path: web::Path<i64>,
    form: Csrf<web::Form<CommentEditForm>>,
) -> impl Responder {
    let comment_id = path.into_inner();
    let form = form.into_inner();
    let content = form.content.trim().to_string();

    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for comment edit: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect("/posts");
        }
    };

    let comment = match comments_db_operations::read_comment(&conn, comment_id) {
        Some(comment) => comment,
        None => {
            set_notification(&session, "This comment does not exist.", "error");
            return redirect("/posts");
        }
    };
    // Only the author may rewrite their own words.
    if user.id != comment.author_id {
        set_notification(&session, "You are not allowed to edit this comment.", "error");
        return redirect("/posts");
    }

    if content.is_empty() {
        set_notification(&session, "A comment needs some text.", "error");
    } else {
        match comments_db_operations::update_content(&conn, comment_id, &content) {
            Ok(()) => {
                log_helpers::record_comment_activity(
                    &conn,
                    LogEventType::CommentUpdated,
                    user.id,
                    comment_id,
                    comment.post_id,
                    &request_metadata(&req),
                );
                set_notification(&session, "Comment updated.", "success");
            }
            Err(e) => {
                log::error!("Failed to edit comment {}: {}", comment_id, e);
                set_notification(&session, "The comment could not be updated.", "error");
            }
        }
    }
    match posts_db_operations::read_post(&conn, comment.post_id) {
        Some(post) => redirect(&format!("/posts/{}", post.slug)),
        None => redirect("/posts"),
    }
}

async fn handle_comment_hide(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    pool: web::Data<crate::DbPool>,
    path: web::Path<i64>,
    _form: Csrf<web::Form<ActionForm>>,
) -> impl Responder {
    let comment_id = path.into_inner();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for comment moderation: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect("/posts");
        }
    };

    let comment = match comments_db_operations::read_comment(&conn, comment_id) {
        Some(comment) => comment,
        None => {
            set_notification(&session, "This comment does not exist.", "error");
            return redirect("/posts");
        }
    };
    // Hiding is for the post author and admins, not the comment author.
    let post_author = posts_db_operations::read_post(&conn, comment.post_id).map(|p| p.author_id);
    if !post_author.map_or(false, |author| may_moderate(&user, author)) {
        set_notification(&session, "You are not allowed to moderate this comment.", "error");
        return redirect("/posts");
    }

    match comments_db_operations::set_hidden(&conn, comment_id, !comment.is_hidden) {
        Ok(()) => {
            log_helpers::record_comment_activity(
                &conn,
                LogEventType::CommentHidden,
                user.id,
                comment_id,
                comment.post_id,
                &request_metadata(&req),
            );
            set_notification(&session, "Comment visibility updated.", "success");
        }
        Err(e) => {
            log::error!("Failed to moderate comment {}: {}", comment_id, e);
            set_notification(&session, "The comment could not be moderated.", "error");
        }
    }
    match posts_db_operations::read_post(&conn, comment.post_id) {
        Some(post) => redirect(&format!("/posts/{}", post.slug)),
        None => redirect("/posts"),
    }
}

async fn handle_comment_delete(
    req: HttpRequest,
    user: AuthenticatedUser,
    session: Session,
    pool: web::Data<crate::DbPool>,
    path: web::Path<i64>,
    _form: Csrf<web::Form<ActionForm>>,
) -> impl Responder {
    let comment_id = path.into_inner();
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for comment deletion: {}", e);
            set_notification(&session, "A database error occurred. Please try again.", "error");
            return redirect("/posts");
        }
    };

    let comment = match comments_db_operations::read_comment(&conn, comment_id) {
        Some(comment) => comment,
        None => {
            set_notification(&session, "This comment does not exist.", "error");
            return redirect("/posts");
        }
    };
    if !may_moderate(&user, comment.author_id) {
        set_notification(&session, "You are not allowed to delete this comment.", "error");
        return redirect("/posts");
    }

    match comments_db_operations::delete_comment(&conn, comment_id) {
        Ok(()) => {
            log_helpers::record_comment_activity(
                &conn,
                LogEventType::CommentDeleted,
                user.id,
                comment_id,
                comment.post_id,
                &request_metadata(&req),
            );
            set_notification(&session, "Comment deleted.", "success");
        }
        Err(e) => {
            log::error!("Failed to delete comment {}: {}", comment_id, e);
            set_notification(&session, "The comment could not be deleted.", "error");
        }
    }
    match posts_db_operations::read_post(&conn, comment.post_id) {
        Some(post) => redirect(&format!("/posts/{}", post.slug)),
        None => redirect("/posts"),
    }
}
