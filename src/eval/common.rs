//! Common traits for scoring results.

/// Contribution of a result to a total score.
pub trait SuggestedScore {
    /// Score counted towards the total.
    fn suggested_score(&self) -> f64;
}

/// Sum the suggested scores in iteration order.
pub fn total_score<'a, T, I>(items: I) -> f64
where
    T: SuggestedScore + 'a,
    I: IntoIterator<Item = &'a T>,
{
    items
        .into_iter()
        .fold(0.0, |acc, item| acc + item.suggested_score())
}
