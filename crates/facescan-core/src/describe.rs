//! Human-readable one-line summaries of analyzed faces.

use crate::expression::dominant;
use crate::types::FaceAnalysis;

/// Render a face as
/// `Detection confidence: 97% Gender: 88% male Age: 31.5 Expression: 76% happy Box: 10,20,64,80`.
pub fn describe(face: &FaceAnalysis) -> String {
    let det = &face.detection;
    let (expr_probability, expr_label) = match dominant(&face.expressions) {
        Some((expr, p)) => (p, expr.as_str()),
        None => (0.0, ""),
    };
    let bbox = [det.x, det.y, det.width, det.height]
        .iter()
        .map(|v| round_half_up(*v as f64).to_string())
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "Detection confidence: {}% Gender: {}% {} Age: {} Expression: {}% {} Box: {}",
        percent(det.confidence),
        percent(face.age_gender.gender_probability),
        face.age_gender.gender,
        one_decimal(face.age_gender.age),
        percent(expr_probability),
        expr_label,
        bbox,
    )
}

fn percent(p: f32) -> i64 {
    round_half_up(100.0 * p as f64)
}

/// Round half toward +inf, so -2.5 → -2 and 2.5 → 3. Never yields `-0`.
fn round_half_up(v: f64) -> i64 {
    (v + 0.5).floor() as i64
}

/// One decimal place, dropping a trailing `.0`.
fn one_decimal(v: f32) -> String {
    let tenths = round_half_up(v as f64 * 10.0);
    if tenths % 10 == 0 {
        format!("{}", tenths / 10)
    } else {
        format!("{}", tenths as f64 / 10.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgeGender, BoundingBox, Embedding, Expression, Gender};

    fn face() -> FaceAnalysis {
        FaceAnalysis {
            detection: BoundingBox {
                x: 10.4, y: 19.6, width: 64.5, height: 80.0,
                confidence: 0.973, landmarks: None,
            },
            expressions: vec![
                (Expression::Neutral, 0.19),
                (Expression::Happy, 0.76),
                (Expression::Sad, 0.05),
            ],
            descriptor: Embedding::new(vec![0.0; 4]),
            age_gender: AgeGender { age: 31.46, gender: Gender::Male, gender_probability: 0.881 },
        }
    }

    #[test]
    fn test_describe_format() {
        assert_eq!(
            describe(&face()),
            "Detection confidence: 97% Gender: 88% male Age: 31.5 Expression: 76% happy Box: 10,20,65,80"
        );
    }

    #[test]
    fn test_whole_age_has_no_decimal() {
        let mut f = face();
        f.age_gender.age = 27.02;
        assert!(describe(&f).contains("Age: 27 "));
    }

    #[test]
    fn test_negative_box_coordinates() {
        let mut f = face();
        f.detection.x = -2.5;
        f.detection.y = -0.2;
        assert!(describe(&f).ends_with("Box: -2,0,65,80"));
    }

    #[test]
    fn test_no_expressions() {
        let mut f = face();
        f.expressions.clear();
        assert!(describe(&f).contains("Expression: 0% "));
    }
}
