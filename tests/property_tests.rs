//! Property-based tests for money handling, discount allocation and
//! invoice numbering.
//!
//! These tests use proptest to verify reconciliation invariants across a
//! wide range of inputs, catching rounding edge cases unit tests miss.

use proptest::prelude::*;
use rust_decimal::Decimal;

use edupay_api::common::{round2, split_vat, to_minor_units};
use edupay_api::services::discounts::allocate_shares;
use edupay_api::services::invoicing::{nip_checksum_valid, normalize_nip};
use edupay_api::services::referrals::waiver_math;
use edupay_api::services::sequences::format_invoice_number;

// Strategies for generating test data

/// Line amounts between 0.01 and 500.00 PLN, two decimal places.
fn amounts_strategy() -> impl Strategy<Value = Vec<Decimal>> {
    prop::collection::vec((1i64..=50_000).prop_map(|g| Decimal::new(g, 2)), 1..=8)
}

/// Discount percent between 0.00 and 100.00, two decimal places.
fn percent_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=10_000).prop_map(|p| Decimal::new(p, 2))
}

/// Gross amounts between 0.01 and 10 000.00, two decimal places.
fn gross_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=1_000_000).prop_map(|g| Decimal::new(g, 2))
}

/// VAT rates between 0% and 30%.
fn vat_rate_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=30).prop_map(|p| Decimal::new(p, 2))
}

/// A NIP whose check digit satisfies the statutory weighted checksum.
///
/// Nine leading digits whose weighted sum is 10 mod 11 admit no valid
/// check digit and are filtered out.
fn valid_nip_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(0u32..10, 9)
        .prop_filter_map("weighted sum 10 admits no check digit", |digits| {
            const WEIGHTS: [u32; 9] = [6, 5, 7, 2, 3, 4, 5, 6, 7];
            let sum: u32 = digits.iter().zip(WEIGHTS).map(|(d, w)| d * w).sum();
            let check = sum % 11;
            if check == 10 {
                return None;
            }
            let mut nip: String = digits.iter().map(|d| d.to_string()).collect();
            nip.push_str(&check.to_string());
            Some(nip)
        })
}

// Property: discount shares always reconcile with the basket totals
proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn discount_shares_reconcile(amounts in amounts_strategy(), percent in percent_strategy()) {
        let breakdown = allocate_shares(&amounts, percent);

        prop_assert_eq!(breakdown.shares.len(), amounts.len());

        let original: Decimal = amounts.iter().copied().sum();
        prop_assert_eq!(breakdown.original_total, original);

        // The discounted total is defined by the percent formula alone.
        let expected = round2(original * (Decimal::ONE_HUNDRED - percent) / Decimal::ONE_HUNDRED);
        prop_assert_eq!(breakdown.discounted_total, expected);

        // Shares absorb every grosz of the discount, no more and no less.
        let share_sum: Decimal = breakdown.shares.iter().copied().sum();
        prop_assert_eq!(share_sum, breakdown.discount_total);
        prop_assert_eq!(
            breakdown.discount_total + breakdown.discounted_total,
            breakdown.original_total
        );
    }

    #[test]
    fn zero_percent_discounts_nothing(amounts in amounts_strategy()) {
        let breakdown = allocate_shares(&amounts, Decimal::ZERO);
        prop_assert_eq!(breakdown.discount_total, Decimal::ZERO);
        prop_assert_eq!(breakdown.discounted_total, breakdown.original_total);
    }

    #[test]
    fn full_discount_zeroes_the_basket(amounts in amounts_strategy()) {
        let breakdown = allocate_shares(&amounts, Decimal::ONE_HUNDRED);
        prop_assert_eq!(breakdown.discounted_total, Decimal::ZERO);
        prop_assert_eq!(breakdown.discount_total, breakdown.original_total);
    }
}

// Property: minor unit conversion is exact for two-decimal amounts
proptest! {
    #[test]
    fn minor_units_scale_exactly(grosz in 0i64..=10_000_000) {
        let amount = Decimal::new(grosz, 2);
        prop_assert_eq!(to_minor_units(amount).unwrap(), grosz);
    }

    #[test]
    fn minor_units_round_before_scaling(millis in 0i64..=10_000_000) {
        // Three decimal places collapse to the rounded two before scaling.
        let amount = Decimal::new(millis, 3);
        prop_assert_eq!(
            to_minor_units(amount).unwrap(),
            to_minor_units(round2(amount)).unwrap()
        );
    }
}

// Property: VAT splits always add back to the gross amount
proptest! {
    #[test]
    fn vat_split_reconciles(gross in gross_strategy(), rate in vat_rate_strategy()) {
        let (net, vat) = split_vat(gross, rate);
        prop_assert_eq!(net + vat, gross);
        prop_assert_eq!(net, round2(net));
        prop_assert!(net <= gross, "net {} exceeds gross {}", net, gross);
    }
}

// Property: NIP checksum validation
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn constructed_nips_validate(nip in valid_nip_strategy()) {
        prop_assert!(nip_checksum_valid(&nip), "constructed NIP rejected: {}", nip);
    }

    #[test]
    fn single_digit_mutations_invalidate(
        nip in valid_nip_strategy(),
        position in 0usize..10,
        bump in 1u32..10,
    ) {
        // No two NIPs differing in exactly one digit are both valid: every
        // weight is coprime with 11, and the check digit is unique.
        let mut digits: Vec<u32> = nip.chars().filter_map(|c| c.to_digit(10)).collect();
        digits[position] = (digits[position] + bump) % 10;
        let mutated: String = digits.iter().map(|d| d.to_string()).collect();

        prop_assert!(
            !nip_checksum_valid(&mutated),
            "mutation of {} at {} produced another valid NIP {}",
            nip,
            position,
            mutated
        );
    }

    #[test]
    fn separators_do_not_affect_validity(nip in valid_nip_strategy()) {
        let formatted = format!(
            "{}-{}-{}-{}",
            &nip[0..3],
            &nip[3..6],
            &nip[6..8],
            &nip[8..10]
        );
        prop_assert_eq!(normalize_nip(&formatted), nip.clone());
        prop_assert!(nip_checksum_valid(&normalize_nip(&formatted)));
    }
}

// Property: fee waiver arithmetic
proptest! {
    #[test]
    fn waiver_math_is_consistent(points in 0i32..10_000, threshold in 1i32..100) {
        let (waivers, to_next) = waiver_math(points, threshold);

        prop_assert_eq!(waivers, points / threshold);
        prop_assert!((1..=threshold).contains(&to_next), "to_next {} out of range", to_next);

        // Earning exactly `to_next` more points yields exactly one more waiver.
        let (after, _) = waiver_math(points + to_next, threshold);
        prop_assert_eq!(after, waivers + 1);
    }
}

// Property: invoice number formatting
proptest! {
    #[test]
    fn invoice_numbers_parse_back(
        year in 2000i32..2100,
        month in 1u32..=12,
        ordinal in 1i32..100_000,
    ) {
        let number = format_invoice_number("FV", year, month, ordinal);

        let segments: Vec<&str> = number.split('/').collect();
        prop_assert_eq!(segments.len(), 4);
        prop_assert_eq!(segments[0], "FV");
        prop_assert_eq!(segments[1].parse::<i32>().unwrap(), year);
        prop_assert_eq!(segments[2].parse::<u32>().unwrap(), month);
        prop_assert_eq!(segments[3].len(), 5);
        prop_assert_eq!(segments[3].parse::<i32>().unwrap(), ordinal);
    }

    #[test]
    fn wide_ordinals_never_truncate(ordinal in 100_000i32..2_000_000) {
        let number = format_invoice_number("FV", 2026, 1, ordinal);
        let tail = number.rsplit('/').next().unwrap();
        prop_assert_eq!(tail.parse::<i32>().unwrap(), ordinal);
    }
}
