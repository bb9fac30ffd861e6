use chrono::NaiveDate;
use proptest::prelude::*;
use risk_engine::aggregation::exposure::{PositionAggregator, PositionExposure};
use risk_engine::aggregation::trade_group::hedge_effectiveness;
use risk_engine::core::currency::{CurrencyCode, FxRateTable};
use risk_engine::core::instrument::{InstrumentId, ProductCategory};
use risk_engine::core::position::{CounterpartyId, Position, QuantityUnit};
use risk_engine::estimation::correlation::CorrelationMatrix;
use risk_engine::limits::monitor::{LimitMonitor, LimitScope, RiskLimit, Severity};
use risk_engine::var::{empirical_quantile, z_score, DeltaNormal, MonteCarlo, VarInputs, VarModel};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

const INSTRUMENTS: [&str; 4] = ["BRENT", "WTI", "GASOIL", "380CST"];

/// Generate a random instrument from a small pool (to force netting).
fn arb_instrument() -> impl Strategy<Value = InstrumentId> {
    prop::sample::select(INSTRUMENTS.to_vec()).prop_map(InstrumentId::new)
}

/// Generate a random counterparty from a small pool.
fn arb_counterparty() -> impl Strategy<Value = CounterpartyId> {
    prop::sample::select(vec!["SHELL-ST", "VITOL-SA", "TRAFIGURA"]).prop_map(CounterpartyId::new)
}

/// Generate a random signed quantity (-100,000 to 100,000 barrels, non-zero).
fn arb_quantity() -> impl Strategy<Value = Decimal> {
    (1i64..100_000i64, any::<bool>())
        .prop_map(|(q, short)| Decimal::from(if short { -q } else { q }))
}

/// Generate a random price in cents (40.00 to 120.00).
fn arb_price() -> impl Strategy<Value = Decimal> {
    (4_000i64..12_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_position() -> impl Strategy<Value = Position> {
    (arb_instrument(), arb_quantity(), arb_price(), arb_counterparty()).prop_map(
        |(instrument, quantity, price, counterparty)| {
            Position::new(
                instrument,
                ProductCategory::crude_oil(),
                quantity,
                QuantityUnit::Barrels,
                price,
                CurrencyCode::usd(),
                counterparty,
            )
        },
    )
}

/// Generate a random book of 1..40 positions.
fn arb_book() -> impl Strategy<Value = Vec<Position>> {
    prop::collection::vec(arb_position(), 1..40)
}

/// Exposures, daily volatilities and a common correlation for `n` instruments.
fn arb_market(n: usize) -> impl Strategy<Value = (Vec<f64>, Vec<f64>, f64)> {
    (
        prop::collection::vec(-5_000_000.0f64..5_000_000.0, n),
        prop::collection::vec(0.001f64..0.05, n),
        -0.2f64..0.95,
    )
}

fn inputs(exposures: Vec<f64>, vols: Vec<f64>, rho: f64) -> VarInputs {
    let instruments: Vec<InstrumentId> = (0..exposures.len())
        .map(|i| InstrumentId::new(format!("I{}", i)))
        .collect();
    let correlation = CorrelationMatrix::uniform(instruments.clone(), rho).unwrap();
    VarInputs::new(instruments, exposures, vols, correlation).unwrap()
}

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn exposure(counterparty: &str, notional: Decimal) -> PositionExposure {
    PositionExposure {
        position_id: Uuid::new_v4(),
        instrument: InstrumentId::new("BRENT"),
        category: ProductCategory::crude_oil(),
        counterparty: CounterpartyId::new(counterparty),
        trade_group: None,
        base_quantity: notional / dec!(80),
        notional,
    }
}

proptest! {
    // ===================================================================
    // INVARIANT 1: With uncorrelated instruments, Delta-Normal VaR is
    // z · √Σ(xᵢσᵢ)². Nothing else enters the parametric figure.
    // ===================================================================
    #[test]
    fn delta_normal_diagonal_identity(
        (exposures, vols, _) in arb_market(4),
        confidence in 0.90f64..0.995,
    ) {
        let expected = z_score(confidence).unwrap()
            * exposures
                .iter()
                .zip(&vols)
                .map(|(x, s)| (x * s).powi(2))
                .sum::<f64>()
                .sqrt();
        let result = DeltaNormal.calculate(&inputs(exposures, vols, 0.0), confidence).unwrap();
        prop_assert!((result.var - expected).abs() <= 1e-9 * expected.max(1.0));
    }

    // ===================================================================
    // INVARIANT 2: Euler contributions sum to the portfolio VaR.
    // ===================================================================
    #[test]
    fn delta_normal_contributions_sum_to_var((exposures, vols, rho) in arb_market(4)) {
        let result = DeltaNormal.calculate(&inputs(exposures, vols, rho), 0.99).unwrap();
        prop_assert!(result.contributions_additive);
        prop_assert!((result.contribution_total() - result.var).abs() <= 1e-6 * result.var.max(1.0));
    }

    // ===================================================================
    // INVARIANT 3: Delta-Normal VaR is sub-additive and positively
    // homogeneous. Splitting a book never shows less total risk.
    // ===================================================================
    #[test]
    fn delta_normal_sub_additive(
        (a, vols, rho) in arb_market(3),
        b in prop::collection::vec(-5_000_000.0f64..5_000_000.0, 3),
        k in 0.1f64..10.0,
    ) {
        let var = |x: Vec<f64>| DeltaNormal.calculate(&inputs(x, vols.clone(), rho), 0.95).unwrap().var;
        let sum: Vec<f64> = a.iter().zip(&b).map(|(x, y)| x + y).collect();
        let scaled: Vec<f64> = a.iter().map(|x| x * k).collect();

        let (va, vb) = (var(a), var(b));
        prop_assert!(var(sum) <= (va + vb) * (1.0 + 1e-12) + 1e-6);
        prop_assert!((var(scaled) - k * va).abs() <= 1e-9 * (k * va).max(1.0));
    }

    // ===================================================================
    // INVARIANT 4: Monte Carlo is a pure function of its seed.
    // ===================================================================
    #[test]
    fn monte_carlo_deterministic_for_seed(
        (exposures, vols, rho) in arb_market(3),
        seed in any::<u64>(),
    ) {
        let inputs = inputs(exposures, vols, rho);
        let model = MonteCarlo::new(500, seed);
        let first = model.calculate(&inputs, 0.99).unwrap();
        let second = model.calculate(&inputs, 0.99).unwrap();
        prop_assert_eq!(first.var, second.var);
        prop_assert_eq!(first.expected_shortfall, second.expected_shortfall);
        prop_assert_eq!(first.seed, Some(seed));
    }

    // ===================================================================
    // INVARIANT 5: Hedge effectiveness is always within [0, 1], and a
    // perfect offset (net = 0) is fully effective.
    // ===================================================================
    #[test]
    fn hedge_effectiveness_bounded(gross in 0.0f64..1e9, net in 0.0f64..2e9) {
        let e = hedge_effectiveness(gross, net);
        prop_assert!((0.0..=1.0).contains(&e));
        if gross > 0.0 {
            prop_assert_eq!(hedge_effectiveness(gross, 0.0), 1.0);
        }
    }

    // ===================================================================
    // INVARIANT 6: A value exactly at the limit is never a breach; one
    // cent above always is.
    // ===================================================================
    #[test]
    fn limit_boundary_is_strict(cents in 1i64..1_000_000_000i64) {
        let limit = Decimal::new(cents, 2);
        let limits = vec![RiskLimit::new(
            "Shell",
            LimitScope::Counterparty(CounterpartyId::new("SHELL-ST")),
            limit,
        )];
        let monitor = LimitMonitor::new(dec!(0.10));

        let at = monitor.evaluate(&[exposure("SHELL-ST", -limit)], &limits).unwrap();
        prop_assert_eq!(at.len(), 1);
        prop_assert_eq!(at[0].severity, Severity::Warning);

        let above = monitor
            .evaluate(&[exposure("SHELL-ST", limit + dec!(0.01))], &limits)
            .unwrap();
        prop_assert_eq!(above[0].severity, Severity::Breach);
    }

    // ===================================================================
    // INVARIANT 7: Aggregation depends only on the set of positions, not
    // their order, and notionals are conserved per instrument.
    // ===================================================================
    #[test]
    fn aggregation_order_independent(book in arb_book()) {
        let fx = FxRateTable::new(CurrencyCode::usd());
        let usd = CurrencyCode::usd();
        let forward = PositionAggregator::aggregate(&book, &fx, &usd, as_of()).unwrap();

        let mut reversed = book.clone();
        reversed.reverse();
        let backward = PositionAggregator::aggregate(&reversed, &fx, &usd, as_of()).unwrap();
        prop_assert_eq!(&forward.exposures, &backward.exposures);

        for name in INSTRUMENTS {
            let id = InstrumentId::new(name);
            let expected: Decimal = book
                .iter()
                .filter(|p| p.instrument() == &id)
                .map(|p| p.local_notional())
                .sum();
            prop_assert_eq!(forward.exposures.notional(&id), expected);
        }
        prop_assert!(forward.exposures.gross_notional() >= forward.exposures.net_notional().abs());
    }

    // ===================================================================
    // INVARIANT 8: The empirical quantile stays inside the sample range
    // and is monotone in the probability.
    // ===================================================================
    #[test]
    fn empirical_quantile_monotone(
        mut sample in prop::collection::vec(-1e6f64..1e6, 1..200),
        p in 0.0f64..1.0,
        q in 0.0f64..1.0,
    ) {
        sample.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let (lo, hi) = if p <= q { (p, q) } else { (q, p) };
        let a = empirical_quantile(&sample, lo);
        let b = empirical_quantile(&sample, hi);
        prop_assert!(a <= b + 1e-9);
        prop_assert!(a >= sample[0] && b <= sample[sample.len() - 1]);
    }
}
