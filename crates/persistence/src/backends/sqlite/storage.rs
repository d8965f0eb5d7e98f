//! QuestionStorage and ViewStorage implementations for SQLite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior, ffi, params,
};

use crate::core::storage::check_answer_ids;
use crate::core::{QuestionStorage, QuestionUpdate, ViewStorage};
use crate::error::{BackendError, ConstraintViolation, ResourceError, StorageError, StorageResult};
use crate::types::{
    Answer, AnswerId, Question, QuestionId, Tag, TagId, User, UserId, UserRef, VoteQuestion,
    VoteType,
};

use super::SqliteBackend;
use super::backend::BACKEND_NAME;

fn internal_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: BACKEND_NAME.to_string(),
        message,
        source: None,
    })
}

fn serialization_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::SerializationError { message })
}

fn sql_error(step: &str) -> impl FnOnce(rusqlite::Error) -> StorageError + '_ {
    move |e| internal_error(format!("Failed to {}: {}", step, e))
}

fn constraint_code(e: &rusqlite::Error) -> Option<i32> {
    match e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            Some(err.extended_code)
        }
        _ => None,
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| serialization_error(format!("Invalid timestamp '{}': {}", value, e)))
}

fn owner_id(conn: &Connection, question: &Question) -> StorageResult<UserId> {
    let user = question
        .user
        .as_ref()
        .ok_or(ConstraintViolation::UserMissing)?;

    let exists = conn
        .query_row("SELECT 1 FROM users WHERE id = ?1", [user.id.get()], |_| {
            Ok(())
        })
        .optional()
        .map_err(sql_error("check user"))?
        .is_some();

    if !exists {
        return Err(ResourceError::user_not_found(user.id).into());
    }
    Ok(user.id)
}

/// Replaces the tag links, answers and votes of a question.
fn write_relations(tx: &Transaction<'_>, id: QuestionId, question: &mut Question) -> StorageResult<()> {
    let qid = id.get();

    tx.execute("DELETE FROM question_has_tag WHERE question_id = ?1", [qid])
        .map_err(sql_error("clear tags"))?;
    for tag in &question.tags {
        tx.execute(
            "INSERT OR IGNORE INTO tags (id, name) VALUES (?1, ?2)",
            params![tag.id.get(), tag.name],
        )
        .map_err(sql_error("insert tag"))?;
        tx.execute(
            "INSERT OR IGNORE INTO question_has_tag (question_id, tag_id) VALUES (?1, ?2)",
            params![qid, tag.id.get()],
        )
        .map_err(sql_error("link tag"))?;
    }

    tx.execute("DELETE FROM answers WHERE question_id = ?1", [qid])
        .map_err(sql_error("clear answers"))?;
    for answer in question.answers.iter_mut() {
        tx.execute(
            "INSERT INTO answers (id, question_id, user_id, body, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                answer.id.map(AnswerId::get),
                qid,
                answer.user_id.get(),
                answer.body,
                answer.is_deleted
            ],
        )
        .map_err(sql_error("insert answer"))?;
        if answer.id.is_none() {
            answer.id = Some(AnswerId::new(tx.last_insert_rowid()));
        }
    }

    tx.execute("DELETE FROM votes_on_questions WHERE question_id = ?1", [qid])
        .map_err(sql_error("clear votes"))?;
    for vote in &question.vote_questions {
        tx.execute(
            "INSERT INTO votes_on_questions (question_id, user_id, vote) VALUES (?1, ?2, ?3)",
            params![qid, vote.user_id.get(), vote.vote.value()],
        )
        .map_err(sql_error("insert vote"))?;
    }

    Ok(())
}

struct QuestionRow {
    title: String,
    description: String,
    persist_date_time: String,
    last_update_date_time: String,
    is_deleted: bool,
    user_id: i64,
    full_name: String,
}

/// Loads a question with its owner, tags, answers and votes.
fn load_question(conn: &Connection, id: QuestionId) -> StorageResult<Option<Question>> {
    let qid = id.get();
    let row = conn
        .query_row(
            "SELECT q.title, q.description, q.persist_date_time, q.last_update_date_time,
                    q.is_deleted, u.id, u.full_name
             FROM questions q JOIN users u ON u.id = q.user_id
             WHERE q.id = ?1",
            [qid],
            |row| {
                Ok(QuestionRow {
                    title: row.get(0)?,
                    description: row.get(1)?,
                    persist_date_time: row.get(2)?,
                    last_update_date_time: row.get(3)?,
                    is_deleted: row.get(4)?,
                    user_id: row.get(5)?,
                    full_name: row.get(6)?,
                })
            },
        )
        .optional()
        .map_err(sql_error("read question"))?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare(
            "SELECT t.id, t.name FROM question_has_tag qt JOIN tags t ON t.id = qt.tag_id
             WHERE qt.question_id = ?1 ORDER BY t.id",
        )
        .map_err(sql_error("prepare tag query"))?;
    let tags = stmt
        .query_map([qid], |row| {
            Ok(Tag::new(TagId::new(row.get(0)?), row.get::<_, String>(1)?))
        })
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(sql_error("read tags"))?;

    let mut stmt = conn
        .prepare(
            "SELECT id, user_id, body, is_deleted FROM answers
             WHERE question_id = ?1 ORDER BY id",
        )
        .map_err(sql_error("prepare answer query"))?;
    let answers = stmt
        .query_map([qid], |row| {
            Ok(Answer {
                id: Some(AnswerId::new(row.get(0)?)),
                user_id: UserId::new(row.get(1)?),
                body: row.get(2)?,
                is_deleted: row.get(3)?,
            })
        })
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(sql_error("read answers"))?;

    let mut stmt = conn
        .prepare(
            "SELECT user_id, vote FROM votes_on_questions
             WHERE question_id = ?1 ORDER BY user_id",
        )
        .map_err(sql_error("prepare vote query"))?;
    let votes = stmt
        .query_map([qid], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(sql_error("read votes"))?;
    let vote_questions = votes
        .into_iter()
        .map(|(user_id, value)| {
            VoteType::from_value(value)
                .map(|vote| VoteQuestion {
                    user_id: UserId::new(user_id),
                    vote,
                })
                .ok_or_else(|| serialization_error(format!("Invalid vote value {}", value)))
        })
        .collect::<StorageResult<Vec<_>>>()?;

    Ok(Some(Question {
        id: Some(id),
        title: row.title,
        description: row.description,
        persist_date_time: Some(parse_timestamp(&row.persist_date_time)?),
        last_update_date_time: Some(parse_timestamp(&row.last_update_date_time)?),
        user: Some(UserRef::new(UserId::new(row.user_id), row.full_name)),
        tags,
        is_deleted: Some(row.is_deleted),
        answers,
        vote_questions,
    }))
}

fn query_ids(conn: &Connection, sql: &str, param: Option<i64>) -> StorageResult<Vec<QuestionId>> {
    let mut stmt = conn.prepare(sql).map_err(sql_error("prepare id query"))?;
    let rows = match param {
        Some(value) => stmt
            .query_map([value], |row| row.get::<_, i64>(0))
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>()),
        None => stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>()),
    }
    .map_err(sql_error("query ids"))?;
    Ok(rows.into_iter().map(QuestionId::new).collect())
}

fn reloaded(conn: &Connection, id: QuestionId) -> StorageResult<Question> {
    load_question(conn, id)?
        .ok_or_else(|| internal_error(format!("Question {} vanished after commit", id)))
}

#[async_trait]
impl QuestionStorage for SqliteBackend {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn create(&self, mut question: Question) -> StorageResult<Question> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction().map_err(sql_error("begin transaction"))?;

        let user_id = owner_id(&tx, &question)?;
        check_answer_ids(&question, None)?;
        let now = format_timestamp(Utc::now());
        tx.execute(
            "INSERT INTO questions
                (title, description, persist_date_time, last_update_date_time, user_id, is_deleted)
             VALUES (?1, ?2, ?3, ?3, ?4, ?5)",
            params![
                question.title,
                question.description,
                now,
                user_id.get(),
                question.is_deleted.unwrap_or(false)
            ],
        )
        .map_err(sql_error("insert question"))?;
        let id = QuestionId::new(tx.last_insert_rowid());

        write_relations(&tx, id, &mut question)?;
        tx.commit().map_err(sql_error("commit"))?;

        tracing::debug!(question_id = %id, "Created question");
        reloaded(&conn, id)
    }

    async fn read(&self, id: QuestionId) -> StorageResult<Option<Question>> {
        let conn = self.get_connection()?;
        load_question(&conn, id)
    }

    async fn update(&self, mut question: Question) -> StorageResult<QuestionUpdate> {
        let id = question.id.ok_or(ResourceError::MissingIdentity {
            entity: "Question",
        })?;

        let mut conn = self.get_connection()?;
        // Immediate: the write lock is held from the read of `previous` on.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sql_error("begin transaction"))?;

        let previous =
            load_question(&tx, id)?.ok_or_else(|| ResourceError::question_not_found(id))?;
        check_answer_ids(&question, Some(&previous))?;

        let user_id = owner_id(&tx, &question)?;
        tx.execute(
            "UPDATE questions
             SET title = ?2, description = ?3, last_update_date_time = ?4, user_id = ?5,
                 is_deleted = ?6
             WHERE id = ?1",
            params![
                id.get(),
                question.title,
                question.description,
                format_timestamp(Utc::now()),
                user_id.get(),
                question.is_deleted.unwrap_or(false)
            ],
        )
        .map_err(sql_error("update question"))?;

        write_relations(&tx, id, &mut question)?;
        tx.commit().map_err(sql_error("commit"))?;

        Ok(QuestionUpdate {
            previous,
            current: reloaded(&conn, id)?,
        })
    }

    async fn delete(&self, id: QuestionId) -> StorageResult<()> {
        let conn = self.get_connection()?;
        let affected = conn
            .execute("DELETE FROM questions WHERE id = ?1", [id.get()])
            .map_err(sql_error("delete question"))?;
        if affected == 0 {
            return Err(ResourceError::question_not_found(id).into());
        }
        Ok(())
    }

    async fn exists(&self, id: QuestionId) -> StorageResult<bool> {
        let conn = self.get_connection()?;
        let found = conn
            .query_row("SELECT 1 FROM questions WHERE id = ?1", [id.get()], |_| {
                Ok(())
            })
            .optional()
            .map_err(sql_error("check question"))?;
        Ok(found.is_some())
    }

    async fn list_ids(&self) -> StorageResult<Vec<QuestionId>> {
        let conn = self.get_connection()?;
        query_ids(&conn, "SELECT id FROM questions ORDER BY id", None)
    }

    async fn questions_by_user(&self, user_id: UserId) -> StorageResult<Vec<QuestionId>> {
        let conn = self.get_connection()?;
        query_ids(
            &conn,
            "SELECT id FROM questions WHERE user_id = ?1 ORDER BY id",
            Some(user_id.get()),
        )
    }

    async fn questions_by_tag(&self, tag_id: TagId) -> StorageResult<Vec<QuestionId>> {
        let conn = self.get_connection()?;
        query_ids(
            &conn,
            "SELECT question_id FROM question_has_tag WHERE tag_id = ?1 ORDER BY question_id",
            Some(tag_id.get()),
        )
    }

    async fn save_user(&self, user: User) -> StorageResult<Option<User>> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction().map_err(sql_error("begin transaction"))?;

        let previous = tx
            .query_row(
                "SELECT full_name, email FROM users WHERE id = ?1",
                [user.id.get()],
                |row| Ok(User::new(user.id, row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(sql_error("read user"))?;

        tx.execute(
            "INSERT INTO users (id, full_name, email) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET full_name = excluded.full_name, email = excluded.email",
            params![user.id.get(), user.full_name, user.email],
        )
        .map_err(sql_error("save user"))?;
        tx.commit().map_err(sql_error("commit"))?;

        Ok(previous)
    }

    async fn read_user(&self, id: UserId) -> StorageResult<Option<User>> {
        let conn = self.get_connection()?;
        conn.query_row(
            "SELECT full_name, email FROM users WHERE id = ?1",
            [id.get()],
            |row| Ok(User::new(id, row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()
        .map_err(sql_error("read user"))
    }

    async fn save_tag(&self, tag: Tag) -> StorageResult<Option<Tag>> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction().map_err(sql_error("begin transaction"))?;

        let previous = tx
            .query_row("SELECT name FROM tags WHERE id = ?1", [tag.id.get()], |row| {
                Ok(Tag::new(tag.id, row.get::<_, String>(0)?))
            })
            .optional()
            .map_err(sql_error("read tag"))?;

        tx.execute(
            "INSERT INTO tags (id, name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![tag.id.get(), tag.name],
        )
        .map_err(sql_error("save tag"))?;
        tx.commit().map_err(sql_error("commit"))?;

        Ok(previous)
    }
}

#[async_trait]
impl ViewStorage for SqliteBackend {
    async fn insert_view(&self, question_id: QuestionId, user_id: UserId) -> StorageResult<()> {
        let conn = self.get_connection()?;
        let result = conn.execute(
            "INSERT INTO question_viewed (question_id, user_id, persist_date_time)
             VALUES (?1, ?2, ?3)",
            params![question_id.get(), user_id.get(), format_timestamp(Utc::now())],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) => match constraint_code(&e) {
                Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) | Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => {
                    Err(ResourceError::DuplicateView {
                        question_id,
                        user_id,
                    }
                    .into())
                }
                Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
                    Err(ResourceError::question_not_found(question_id).into())
                }
                _ => Err(internal_error(format!("Failed to insert view: {}", e))),
            },
        }
    }

    async fn has_viewed(&self, question_id: QuestionId, user_id: UserId) -> StorageResult<bool> {
        let conn = self.get_connection()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM question_viewed WHERE question_id = ?1 AND user_id = ?2",
                params![question_id.get(), user_id.get()],
                |_| Ok(()),
            )
            .optional()
            .map_err(sql_error("check view"))?;
        Ok(found.is_some())
    }

    async fn count_views(&self, question_id: QuestionId) -> StorageResult<u64> {
        let conn = self.get_connection()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM question_viewed WHERE question_id = ?1",
                [question_id.get()],
                |row| row.get(0),
            )
            .map_err(sql_error("count views"))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend() -> SqliteBackend {
        let backend = SqliteBackend::in_memory().unwrap();
        backend
            .save_user(User::new(UserId::new(1), "Ada", "ada@example.com"))
            .await
            .unwrap();
        backend
    }

    fn question() -> Question {
        let mut question = Question::new("title", "description")
            .with_user(UserRef::new(UserId::new(1), "Ada"))
            .with_tag(Tag::new(TagId::new(7), "rust"));
        question.is_deleted = Some(false);
        question.add_answer(Answer::new(UserId::new(2), "first"));
        question.add_vote(UserId::new(3), VoteType::Up);
        question
    }

    #[tokio::test]
    async fn test_create_and_read_back() {
        let backend = backend().await;
        let created = backend.create(question()).await.unwrap();
        let id = created.id.unwrap();

        let read = backend.read(id).await.unwrap().unwrap();
        assert_eq!(read, created);
        assert_eq!(read.tags, vec![Tag::new(TagId::new(7), "rust")]);
        assert_eq!(read.answers.len(), 1);
        assert!(read.answers[0].id.is_some());
        assert_eq!(read.vote_questions[0].vote, VoteType::Up);
        assert_eq!(read.is_deleted, Some(false));
    }

    #[tokio::test]
    async fn test_update_replaces_relations() {
        let backend = backend().await;
        let mut question = backend.create(question()).await.unwrap();

        question.remove_tag(TagId::new(7));
        question.add_tag(Tag::new(TagId::new(8), "sqlite"));
        question.add_vote(UserId::new(3), VoteType::Down);
        let update = backend.update(question.clone()).await.unwrap();
        let updated = update.current;

        assert_eq!(update.previous.tags, vec![Tag::new(TagId::new(7), "rust")]);
        assert_eq!(updated.tags, vec![Tag::new(TagId::new(8), "sqlite")]);
        assert_eq!(updated.vote_questions[0].vote, VoteType::Down);
        assert_eq!(updated.persist_date_time, question.persist_date_time);
        assert!(
            backend
                .questions_by_tag(TagId::new(7))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_foreign_answer_ids_rejected() {
        let backend = backend().await;
        let first = backend.create(question()).await.unwrap();
        let second = backend.create(question()).await.unwrap();
        let foreign = first.answers[0].clone();

        let mut edited = second.clone();
        edited.add_answer(foreign.clone());
        let err = backend.update(edited).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Resource(ResourceError::AnswerNotOwned { answer_id })
                if Some(answer_id) == foreign.id
        ));

        // Both questions are untouched.
        assert_eq!(backend.read(first.id.unwrap()).await.unwrap().unwrap(), first);
        assert_eq!(backend.read(second.id.unwrap()).await.unwrap().unwrap(), second);
    }

    #[tokio::test]
    async fn test_unknown_owner_rejected() {
        let backend = SqliteBackend::in_memory().unwrap();
        let err = backend.create(question()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(backend.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_user_returns_previous() {
        let backend = backend().await;
        let previous = backend
            .save_user(User::new(UserId::new(1), "Ada King", "ada@example.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(previous.full_name, "Ada");

        let id = backend.create(question()).await.unwrap().id.unwrap();
        let read = backend.read(id).await.unwrap().unwrap();
        assert_eq!(read.user.unwrap().full_name, "Ada King");
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let backend = backend().await;
        let id = backend.create(question()).await.unwrap().id.unwrap();
        backend.insert_view(id, UserId::new(4)).await.unwrap();

        backend.delete(id).await.unwrap();
        assert!(backend.read(id).await.unwrap().is_none());
        assert_eq!(backend.count_views(id).await.unwrap(), 0);
        assert!(backend.delete(id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_view_constraints() {
        let backend = backend().await;
        let id = backend.create(question()).await.unwrap().id.unwrap();

        backend.insert_view(id, UserId::new(4)).await.unwrap();
        let duplicate = backend.insert_view(id, UserId::new(4)).await;
        assert!(matches!(
            duplicate,
            Err(StorageError::Resource(ResourceError::DuplicateView { .. }))
        ));

        let missing = backend.insert_view(QuestionId::new(404), UserId::new(4)).await;
        assert!(missing.unwrap_err().is_not_found());
        assert_eq!(backend.count_views(id).await.unwrap(), 1);
    }
}
