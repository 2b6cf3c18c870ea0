use std::collections::BTreeMap;

/// Generates a change plan using the greedy largest-first algorithm.
///
/// `available` maps denomination (minor units) to the number of coins the
/// tubes can currently pay out. Returns `(plan, remainder)` where the plan
/// lists `(denomination, count)` pairs in dispensing order (largest
/// denomination first) and `remainder` is the value that could not be
/// covered. A remainder of zero means the plan sums exactly to `amount`.
///
/// No backtracking is attempted; canonical currency cascades (10, 20, 50,
/// 100, 200, 500) make the greedy sweep optimal.
#[must_use]
pub fn plan_change(amount: u32, available: &BTreeMap<u32, u32>) -> (Vec<(u32, u32)>, u32) {
    let mut plan = Vec::new();
    let mut remaining = amount;

    for (&denomination, &count) in available.iter().rev() {
        if remaining == 0 {
            break;
        }
        if denomination == 0 || count == 0 {
            continue;
        }

        let use_count = (remaining / denomination).min(count);
        if use_count > 0 {
            plan.push((denomination, use_count));
            remaining -= use_count * denomination;
        }
    }

    (plan, remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tubes(entries: &[(u32, u32)]) -> BTreeMap<u32, u32> {
        entries.iter().copied().collect()
    }

    #[test]
    fn exact_plan_largest_first() {
        let available = tubes(&[(10, 10), (20, 10), (50, 10), (100, 10)]);

        // 170 = 1x100 + 1x50 + 1x20
        let (plan, remainder) = plan_change(170, &available);
        assert_eq!(remainder, 0);
        assert_eq!(plan, vec![(100, 1), (50, 1), (20, 1)]);

        // 250 = 2x100 + 1x50
        let (plan, remainder) = plan_change(250, &available);
        assert_eq!(remainder, 0);
        assert_eq!(plan, vec![(100, 2), (50, 1)]);
    }

    #[test]
    fn limited_inventory_falls_through_to_smaller_coins() {
        let available = tubes(&[(10, 10), (20, 10), (50, 0), (100, 1)]);

        // 200 = 1x100 + 5x20 (no 50s, only one 100)
        let (plan, remainder) = plan_change(200, &available);
        assert_eq!(remainder, 0);
        assert_eq!(plan, vec![(100, 1), (20, 5)]);
    }

    #[test]
    fn insufficient_inventory_reports_shortfall() {
        // Amount 70, tubes 1x50 only: greedy takes the 50, 20 remains.
        let available = tubes(&[(50, 1), (20, 0), (10, 0)]);
        let (plan, remainder) = plan_change(70, &available);
        assert_eq!(plan, vec![(50, 1)]);
        assert_eq!(remainder, 20);
    }

    #[test]
    fn unrepresentable_amount_reports_shortfall() {
        let available = tubes(&[(10, 10), (20, 10)]);
        let (_, remainder) = plan_change(5, &available);
        assert_eq!(remainder, 5);
    }

    #[test]
    fn zero_amount_yields_empty_plan() {
        let available = tubes(&[(10, 10)]);
        let (plan, remainder) = plan_change(0, &available);
        assert!(plan.is_empty());
        assert_eq!(remainder, 0);
    }

    #[test]
    fn canonical_cascade_sums_exactly_and_respects_availability() {
        let available = tubes(&[(10, 20), (20, 20), (50, 20), (100, 20), (200, 20), (500, 20)]);

        for amount in (10..=2000).step_by(10) {
            let (plan, remainder) = plan_change(amount, &available);
            assert_eq!(remainder, 0, "amount {amount} should be coverable");

            let total: u32 = plan.iter().map(|(d, c)| d * c).sum();
            assert_eq!(total, amount);

            for (denomination, count) in plan {
                assert!(count <= available[&denomination]);
            }
        }
    }
}
