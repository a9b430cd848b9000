//! Question ordering: move, swap, renumber and duplicate.
//!
//! Every structural change is followed by [`renumber`] so that `order`
//! values stay a dense `0..n` permutation.

use crate::error::BuilderError;
use crate::models::{Question, QuestionId, QuestionOrder};

pub const COPY_SUFFIX: &str = " (copie)";

/// Removes the item at `from` and inserts it at `to` in the shortened list.
pub fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) -> Result<(), BuilderError> {
    let len = items.len();
    if from >= len {
        return Err(BuilderError::IndexOutOfRange { index: from, len });
    }
    if to >= len {
        return Err(BuilderError::IndexOutOfRange { index: to, len });
    }
    if from != to {
        let item = items.remove(from);
        items.insert(to, item);
    }
    Ok(())
}

/// Swaps with the previous item. Returns `false` at the top.
pub fn move_up<T>(items: &mut [T], index: usize) -> bool {
    if index == 0 || index >= items.len() {
        return false;
    }
    items.swap(index - 1, index);
    true
}

/// Swaps with the next item. Returns `false` at the bottom.
pub fn move_down<T>(items: &mut [T], index: usize) -> bool {
    if index + 1 >= items.len() {
        return false;
    }
    items.swap(index, index + 1);
    true
}

pub fn renumber(questions: &mut [Question]) {
    for (index, q) in questions.iter_mut().enumerate() {
        q.order = index;
    }
}

/// Copy of `question` with a fresh local id, appended after `count` questions.
pub fn duplicate(question: &Question, count: usize) -> Question {
    Question {
        id: QuestionId::new_local(),
        title: format!("{}{}", question.title, COPY_SUFFIX),
        order: count,
        created_at: None,
        updated_at: None,
        ..question.clone()
    }
}

/// Order batch for the backend. Local questions have nothing to reorder yet.
pub fn order_assignments(questions: &[Question]) -> Vec<QuestionOrder> {
    questions
        .iter()
        .filter_map(|q| {
            q.id.as_persisted().map(|id| QuestionOrder {
                question_id: id.to_string(),
                order: q.order,
            })
        })
        .collect()
}

/// Sorts by the `order` field and then renumbers, for lists loaded from the backend.
pub fn normalize_order(questions: &mut [Question]) {
    questions.sort_by_key(|q| q.order);
    renumber(questions);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::{choice, question};
    use crate::question_types::QuestionType;

    fn abc() -> Vec<Question> {
        let mut qs = vec![
            question("A", QuestionType::ShortText),
            question("B", QuestionType::ShortText),
            question("C", QuestionType::ShortText),
        ];
        renumber(&mut qs);
        qs
    }

    fn ids(qs: &[Question]) -> Vec<String> {
        qs.iter().map(|q| q.id.to_string()).collect()
    }

    #[test]
    fn move_first_to_last() {
        let mut qs = abc();
        move_item(&mut qs, 0, 2).unwrap();
        assert_eq!(ids(&qs), ["B", "C", "A"]);
        renumber(&mut qs);
        assert_eq!(qs.iter().map(|q| q.order).collect::<Vec<_>>(), [0, 1, 2]);
        assert_eq!(qs[2].order, 2);
    }

    #[test]
    fn move_last_to_first() {
        let mut items = vec![1, 2, 3, 4];
        move_item(&mut items, 3, 0).unwrap();
        assert_eq!(items, [4, 1, 2, 3]);
    }

    #[test]
    fn move_out_of_range_is_rejected() {
        let mut items = vec![1, 2];
        assert!(matches!(
            move_item(&mut items, 0, 2),
            Err(BuilderError::IndexOutOfRange { index: 2, len: 2 })
        ));
        assert_eq!(items, [1, 2]);
    }

    #[test]
    fn up_and_down_are_noops_at_the_edges() {
        let mut items = vec!['a', 'b', 'c'];
        assert!(!move_up(&mut items, 0));
        assert!(!move_down(&mut items, 2));
        assert_eq!(items, ['a', 'b', 'c']);
        assert!(move_up(&mut items, 2));
        assert_eq!(items, ['a', 'c', 'b']);
        assert!(move_down(&mut items, 0));
        assert_eq!(items, ['c', 'a', 'b']);
    }

    #[test]
    fn duplicate_keeps_configuration() {
        let mut q = choice("q1", QuestionType::Checkbox, &["A", "B"]);
        q.is_required = true;
        q.description = Some("desc".into());
        q.min_length = Some(3);
        q.max_length = Some(120);
        q.min_value = Some(-1.5);
        q.max_value = Some(10.0);
        let copy = duplicate(&q, 5);
        assert_ne!(copy.id, q.id);
        assert!(!copy.id.is_persisted());
        assert_eq!(copy.title, "Question q1 (copie)");
        assert_eq!(copy.options, q.options);
        assert_eq!(copy.description, q.description);
        assert!(copy.is_required);
        assert_eq!(copy.min_length, Some(3));
        assert_eq!(copy.max_length, Some(120));
        assert_eq!(copy.min_value, Some(-1.5));
        assert_eq!(copy.max_value, Some(10.0));
        assert_eq!(copy.question_type, q.question_type);
        assert_eq!(copy.order, 5);
    }

    #[test]
    fn assignments_skip_local_questions() {
        let mut qs = abc();
        qs.insert(1, Question::new_local("f1", QuestionType::Email, 0));
        renumber(&mut qs);
        let batch = order_assignments(&qs);
        assert_eq!(
            batch,
            vec![
                QuestionOrder { question_id: "A".into(), order: 0 },
                QuestionOrder { question_id: "B".into(), order: 2 },
                QuestionOrder { question_id: "C".into(), order: 3 },
            ]
        );
    }

    #[test]
    fn normalize_sorts_sparse_orders() {
        let mut qs = abc();
        qs[0].order = 9;
        qs[1].order = 4;
        qs[2].order = 7;
        normalize_order(&mut qs);
        assert_eq!(ids(&qs), ["B", "C", "A"]);
        assert_eq!(qs.iter().map(|q| q.order).collect::<Vec<_>>(), [0, 1, 2]);
    }
}
