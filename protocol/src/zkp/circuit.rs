//! # Shipping Condition R1CS Circuit
//!
//! The statement being proved is:
//!
//! ```text
//! "I know (country, region, r, weight, length, width, height) such that:
//!     1. country·g1 + region·g2 + pid·g3 + r·h = c       (commitment opens)
//!     2. country = pid_country                            (PID namespace)
//!     3. pid_region_flag · (region - pid_region) = 0     (PID admin1, if shown)
//!     4. country_flag · Π(country - cᵢ) = 0               (country allowed)
//!     5. region_flag  · Π(region  - rᵢ) = 0               (region allowed)
//!     6. weight ≤ max_weight                              (range proof)
//!     7. length ≤ max_length, width ≤ max_width,
//!        height ≤ max_height                              (range proofs)"
//! ```
//!
//! ## PID anchoring
//!
//! The verifier derives `pid_country` from the PID's HRP and, when the PID
//! discloses admin1, `pid_region` from its payload. Both are public inputs,
//! so the hidden country and region cannot differ from what the PID itself
//! already states. A PID at country precision leaves `pid_region_flag` at 0.
//!
//! ## Membership
//!
//! A restricted list sets its flag to 1 and fills the [`CONDITION_SLOTS`]
//! slots with the tagged hashes of the allowed codes, padding with the
//! first code. The product vanishes iff the hidden value equals one slot.
//! An unrestricted list has flag 0 and all-zero slots, which satisfies the
//! constraint for any value.
//!
//! ## Range proofs
//!
//! Same construction for each of the four limits: allocate the 64 bits of
//! `max - value` as booleans and enforce that they recompose to the
//! difference. `2^64 < |Fr|`, so this holds only when `value ≤ max` in the
//! integers.
//!
//! ## Public inputs (in order)
//!
//! | index  | value |
//! |--------|-------|
//! | 0      | `pid_binding` |
//! | 1      | `conditions_digest` |
//! | 2      | address commitment `c` |
//! | 3      | `pid_country` |
//! | 4      | `pid_region_flag` |
//! | 5      | `pid_region` |
//! | 6      | country flag |
//! | 7..23  | country slots |
//! | 23     | region flag |
//! | 24..40 | region slots |
//! | 40     | max weight (g) |
//! | 41..44 | max length, width, height (mm) |

use ark_bn254::Fr;
use ark_ff::{One, Zero};
use ark_r1cs_std::{
    alloc::AllocVar,
    boolean::Boolean,
    eq::EqGadget,
    fields::{fp::FpVar, FieldVar},
};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use super::commitment::CommitmentParams;
use super::ZkpError;
use crate::config::{CONDITION_SLOTS, DOMAIN_COUNTRY, DOMAIN_PID, DOMAIN_REGION, RANGE_BITS};
use crate::crypto::hash::tagged_field;
use crate::pid::{NormalizedAddress, Pid};
use crate::shipping::condition::{normalize_code, Limits, Measurement, ShippingCondition};

/// Number of field elements in [`PublicInputs::to_vec`].
pub const NUM_PUBLIC_INPUTS: usize = 6 + 2 * (1 + CONDITION_SLOTS) + 4;

// ---------------------------------------------------------------------------
// Public statement
// ---------------------------------------------------------------------------

/// A membership list as the circuit sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotList {
    pub flag: Fr,
    pub slots: [Fr; CONDITION_SLOTS],
}

impl SlotList {
    /// Build from an optional list of codes, hashing each under `tag`.
    /// The caller has already checked the length.
    pub fn from_codes(tag: &[u8], codes: &Option<Vec<String>>) -> Self {
        match codes {
            None => Self {
                flag: Fr::zero(),
                slots: [Fr::zero(); CONDITION_SLOTS],
            },
            Some(codes) => {
                let hashed: Vec<Fr> = codes
                    .iter()
                    .take(CONDITION_SLOTS)
                    .map(|code| tagged_field(tag, normalize_code(code).as_bytes()))
                    .collect();
                // An empty allow-list pads with zero, which no tagged hash
                // equals in practice, so nothing passes.
                let pad = hashed.first().copied().unwrap_or_else(Fr::zero);
                let mut slots = [pad; CONDITION_SLOTS];
                slots[..hashed.len()].copy_from_slice(&hashed);
                Self {
                    flag: Fr::one(),
                    slots,
                }
            }
        }
    }
}

/// Everything the verifier recomputes from the PID, the conditions and the
/// commitment carried in the proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicInputs {
    pub pid_binding: Fr,
    pub conditions_digest: Fr,
    pub commitment: Fr,
    pub pid_country: Fr,
    pub pid_region_flag: Fr,
    pub pid_region: Fr,
    pub countries: SlotList,
    pub regions: SlotList,
    pub limits: Limits,
}

impl PublicInputs {
    pub fn new(
        pid: &Pid,
        conditions: &ShippingCondition,
        commitment: Fr,
    ) -> Result<Self, ZkpError> {
        conditions.validate()?;
        let disclosed = pid.decode()?;
        let (pid_region_flag, pid_region) = match disclosed.admin1.as_deref() {
            Some(admin1) => (
                Fr::one(),
                tagged_field(DOMAIN_REGION, normalize_code(admin1).as_bytes()),
            ),
            None => (Fr::zero(), Fr::zero()),
        };
        Ok(Self {
            pid_binding: pid_binding(pid),
            conditions_digest: conditions.digest()?,
            commitment,
            pid_country: country_value(&disclosed),
            pid_region_flag,
            pid_region,
            countries: SlotList::from_codes(DOMAIN_COUNTRY, &conditions.allowed_countries),
            regions: SlotList::from_codes(DOMAIN_REGION, &conditions.allowed_regions),
            limits: conditions.limits()?,
        })
    }

    /// Flattened in allocation order. The Groth16 verifier consumes this.
    pub fn to_vec(&self) -> Vec<Fr> {
        let mut inputs = Vec::with_capacity(NUM_PUBLIC_INPUTS);
        inputs.push(self.pid_binding);
        inputs.push(self.conditions_digest);
        inputs.push(self.commitment);
        inputs.push(self.pid_country);
        inputs.push(self.pid_region_flag);
        inputs.push(self.pid_region);
        inputs.push(self.countries.flag);
        inputs.extend_from_slice(&self.countries.slots);
        inputs.push(self.regions.flag);
        inputs.extend_from_slice(&self.regions.slots);
        inputs.push(Fr::from(self.limits.weight_g));
        inputs.extend(self.limits.dims_mm.iter().map(|&d| Fr::from(d)));
        inputs
    }
}

/// `H("pid:" || pid)` in Fr.
pub fn pid_binding(pid: &Pid) -> Fr {
    tagged_field(DOMAIN_PID, pid.as_bytes())
}

/// Tagged hash of the address country.
pub fn country_value(address: &NormalizedAddress) -> Fr {
    tagged_field(DOMAIN_COUNTRY, normalize_code(&address.country).as_bytes())
}

/// Tagged hash of the address region (`admin1`, or empty when absent).
pub fn region_value(address: &NormalizedAddress) -> Fr {
    let region = address.admin1.as_deref().map(normalize_code).unwrap_or_default();
    tagged_field(DOMAIN_REGION, region.as_bytes())
}

// ---------------------------------------------------------------------------
// Witness
// ---------------------------------------------------------------------------

/// The prover's secret values.
#[derive(Clone, Copy, Debug)]
pub struct Witness {
    pub country: Fr,
    pub region: Fr,
    pub blinding: Fr,
    pub parcel: Measurement,
}

// ---------------------------------------------------------------------------
// Circuit definition
// ---------------------------------------------------------------------------

/// Groth16 circuit for the shipping-condition statement.
///
/// `public` and `witness` are `None` during key generation, when only the
/// constraint topology matters.
#[derive(Clone)]
pub struct ShippingConditionCircuit {
    params: CommitmentParams,
    public: Option<PublicInputs>,
    witness: Option<Witness>,
}

impl ShippingConditionCircuit {
    /// A fully-populated circuit for proof generation.
    pub fn new(params: CommitmentParams, public: PublicInputs, witness: Witness) -> Self {
        Self {
            params,
            public: Some(public),
            witness: Some(witness),
        }
    }

    /// A blank circuit for CRS generation.
    pub fn blank(params: CommitmentParams) -> Self {
        Self {
            params,
            public: None,
            witness: None,
        }
    }

    fn input<F>(&self, cs: &ConstraintSystemRef<Fr>, f: F) -> Result<FpVar<Fr>, SynthesisError>
    where
        F: FnOnce(&PublicInputs) -> Fr,
    {
        FpVar::new_input(ark_relations::ns!(cs, "public_input"), || {
            self.public.as_ref().map(f).ok_or(SynthesisError::AssignmentMissing)
        })
    }

    fn secret<F>(&self, cs: &ConstraintSystemRef<Fr>, f: F) -> Result<FpVar<Fr>, SynthesisError>
    where
        F: FnOnce(&Witness) -> Fr,
    {
        FpVar::new_witness(ark_relations::ns!(cs, "witness"), || {
            self.witness.as_ref().map(f).ok_or(SynthesisError::AssignmentMissing)
        })
    }

    fn slot_list(
        &self,
        cs: &ConstraintSystemRef<Fr>,
        pick: fn(&PublicInputs) -> &SlotList,
    ) -> Result<(FpVar<Fr>, Vec<FpVar<Fr>>), SynthesisError> {
        let flag = self.input(cs, |p| pick(p).flag)?;
        let slots = (0..CONDITION_SLOTS)
            .map(|i| self.input(cs, |p| pick(p).slots[i]))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((flag, slots))
    }
}

// ---------------------------------------------------------------------------
// Constraint synthesizer
// ---------------------------------------------------------------------------

impl ConstraintSynthesizer<Fr> for ShippingConditionCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // ===================================================================
        // 1. Public inputs, in the order of PublicInputs::to_vec
        // ===================================================================

        let pid_var = self.input(&cs, |p| p.pid_binding)?;
        let digest_var = self.input(&cs, |p| p.conditions_digest)?;
        let commitment_var = self.input(&cs, |p| p.commitment)?;
        let pid_country_var = self.input(&cs, |p| p.pid_country)?;
        let pid_region_flag = self.input(&cs, |p| p.pid_region_flag)?;
        let pid_region_var = self.input(&cs, |p| p.pid_region)?;
        let (country_flag, country_slots) = self.slot_list(&cs, |p| &p.countries)?;
        let (region_flag, region_slots) = self.slot_list(&cs, |p| &p.regions)?;
        let max_weight = self.input(&cs, |p| Fr::from(p.limits.weight_g))?;
        let max_dims = (0..3)
            .map(|i| self.input(&cs, |p| Fr::from(p.limits.dims_mm[i])))
            .collect::<Result<Vec<_>, _>>()?;

        // ===================================================================
        // 2. Private witnesses
        // ===================================================================

        let country_var = self.secret(&cs, |w| w.country)?;
        let region_var = self.secret(&cs, |w| w.region)?;
        let blinding_var = self.secret(&cs, |w| w.blinding)?;
        let weight_var = self.secret(&cs, |w| Fr::from(w.parcel.weight_g))?;
        let dim_vars = (0..3)
            .map(|i| self.secret(&cs, |w| Fr::from(w.parcel.dims_mm[i])))
            .collect::<Result<Vec<_>, _>>()?;

        // ===================================================================
        // 3. Commitment opens to (country, region, pid_binding)
        // ===================================================================

        let g_country = FpVar::<Fr>::constant(self.params.g_country);
        let g_region = FpVar::<Fr>::constant(self.params.g_region);
        let g_pid = FpVar::<Fr>::constant(self.params.g_pid);
        let h = FpVar::<Fr>::constant(self.params.h);

        let computed =
            &country_var * &g_country + &region_var * &g_region + &pid_var * &g_pid + &blinding_var * &h;
        computed.enforce_equal(&commitment_var)?;

        // The digest takes part in no relation of its own. Square it so the
        // proof is bound to it like every other input.
        let _digest_sq = &digest_var * &digest_var;

        // ===================================================================
        // 4. Hidden country and region agree with the PID
        // ===================================================================

        country_var.enforce_equal(&pid_country_var)?;
        let region_gap = &region_var - &pid_region_var;
        (&pid_region_flag * &region_gap).enforce_equal(&FpVar::zero())?;

        // ===================================================================
        // 5. Membership
        // ===================================================================

        enforce_membership(&country_flag, &country_slots, &country_var)?;
        enforce_membership(&region_flag, &region_slots, &region_var)?;

        // ===================================================================
        // 6. Range proofs
        // ===================================================================

        let parcel = self.witness.map(|w| w.parcel);
        let limits = self.public.as_ref().map(|p| p.limits);

        enforce_le(
            &cs,
            &weight_var,
            &max_weight,
            parcel.zip(limits).map(|(p, l)| (p.weight_g, l.weight_g)),
        )?;
        for i in 0..3 {
            enforce_le(
                &cs,
                &dim_vars[i],
                &max_dims[i],
                parcel.zip(limits).map(|(p, l)| (p.dims_mm[i], l.dims_mm[i])),
            )?;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Gadgets
// ---------------------------------------------------------------------------

/// `flag · Π(value - sᵢ) = 0`.
fn enforce_membership(
    flag: &FpVar<Fr>,
    slots: &[FpVar<Fr>],
    value: &FpVar<Fr>,
) -> Result<(), SynthesisError> {
    let mut product = FpVar::<Fr>::one();
    for slot in slots {
        product *= value - slot;
    }
    (flag * &product).enforce_equal(&FpVar::zero())
}

/// `value ≤ max` via a [`RANGE_BITS`]-bit decomposition of `max - value`.
/// `assignment` is `(value, max)` when proving and `None` during setup.
fn enforce_le(
    cs: &ConstraintSystemRef<Fr>,
    value: &FpVar<Fr>,
    max: &FpVar<Fr>,
    assignment: Option<(u64, u64)>,
) -> Result<(), SynthesisError> {
    // A negative difference wraps; its bits then recompose to the wrong
    // field element and the constraint below fails.
    let bits = assignment.map(|(value, max)| max.wrapping_sub(value));

    let mut reconstructed = FpVar::<Fr>::zero();
    let mut power_of_two = FpVar::<Fr>::one();
    let two = FpVar::<Fr>::constant(Fr::from(2u64));

    for i in 0..RANGE_BITS {
        let bit = Boolean::<Fr>::new_witness(ark_relations::ns!(cs, "delta_bit"), || {
            bits.map(|delta| (delta >> i) & 1 == 1)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        reconstructed += FpVar::<Fr>::from(bit) * &power_of_two;
        power_of_two *= &two;
    }

    reconstructed.enforce_equal(&(max - value))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pid::{encode, Precision};
    use crate::shipping::condition::{Dimensions, ParcelInfo};
    use ark_ff::UniformRand;
    use ark_relations::r1cs::ConstraintSystem;
    use ark_std::rand::{rngs::StdRng, SeedableRng};

    fn tokyo() -> NormalizedAddress {
        NormalizedAddress::new("JP").with_admin1("13").with_locality("SHIBUYA")
    }

    /// Build the circuit the way the prover does, without checking the
    /// conditions first.
    fn circuit(address: &NormalizedAddress, conditions: &ShippingCondition, kg: f64) -> ShippingConditionCircuit {
        let pid = encode(address, Precision::Locality).unwrap();
        circuit_for(&pid, address, conditions, kg)
    }

    /// As [`circuit`], with the hidden address chosen independently of the PID.
    fn circuit_for(
        pid: &Pid,
        address: &NormalizedAddress,
        conditions: &ShippingCondition,
        kg: f64,
    ) -> ShippingConditionCircuit {
        let mut rng = StdRng::seed_from_u64(42);
        let params = CommitmentParams::derive();
        let witness = Witness {
            country: country_value(address),
            region: region_value(address),
            blinding: Fr::rand(&mut rng),
            parcel: ParcelInfo::new(kg, Some(Dimensions::cm(30.0, 20.0, 10.0))).measure().unwrap(),
        };
        let commitment = params.commit(witness.country, witness.region, pid_binding(pid), witness.blinding);
        let public = PublicInputs::new(pid, conditions, commitment).unwrap();
        ShippingConditionCircuit::new(params, public, witness)
    }

    fn satisfied(c: ShippingConditionCircuit) -> bool {
        let cs = ConstraintSystem::<Fr>::new_ref();
        c.generate_constraints(cs.clone()).unwrap();
        cs.is_satisfied().unwrap()
    }

    #[test]
    fn satisfied_for_matching_conditions() {
        let cond = ShippingCondition::default()
            .countries(["JP"])
            .regions(["13", "14"])
            .max_weight_kg(30.0)
            .max_dimensions(Dimensions::cm(60.0, 40.0, 40.0));
        assert!(satisfied(circuit(&tokyo(), &cond, 2.0)));
    }

    #[test]
    fn satisfied_when_unrestricted() {
        assert!(satisfied(circuit(&tokyo(), &ShippingCondition::default(), 1000.0)));
    }

    #[test]
    fn unsatisfied_for_wrong_country() {
        let cond = ShippingCondition::default().countries(["US", "CA"]);
        assert!(!satisfied(circuit(&tokyo(), &cond, 1.0)));
    }

    #[test]
    fn unsatisfied_for_wrong_region() {
        let cond = ShippingCondition::default().regions(["27"]);
        assert!(!satisfied(circuit(&tokyo(), &cond, 1.0)));
    }

    #[test]
    fn unsatisfied_when_overweight() {
        let cond = ShippingCondition::default().max_weight_kg(30.0);
        assert!(!satisfied(circuit(&tokyo(), &cond, 30.5)));
    }

    #[test]
    fn unsatisfied_for_empty_allow_list() {
        let cond = ShippingCondition::default().countries(Vec::<String>::new());
        assert!(!satisfied(circuit(&tokyo(), &cond, 1.0)));
    }

    #[test]
    fn unsatisfied_when_pid_country_differs_from_address() {
        // A US PID cannot carry a JP address past a JP-only list.
        let us = encode(&NormalizedAddress::new("US").with_admin1("CA"), Precision::Country).unwrap();
        let cond = ShippingCondition::default().countries(["JP"]);
        assert!(!satisfied(circuit_for(&us, &tokyo(), &cond, 1.0)));
        assert!(!satisfied(circuit_for(&us, &tokyo(), &ShippingCondition::default(), 1.0)));
    }

    #[test]
    fn unsatisfied_when_pid_region_differs_from_address() {
        let osaka = encode(&NormalizedAddress::new("JP").with_admin1("27"), Precision::Admin1).unwrap();
        let cond = ShippingCondition::default().regions(["13"]);
        assert!(!satisfied(circuit_for(&osaka, &tokyo(), &cond, 1.0)));
    }

    #[test]
    fn country_precision_pid_leaves_region_free() {
        let jp = encode(&tokyo(), Precision::Country).unwrap();
        let cond = ShippingCondition::default().countries(["JP"]).regions(["13"]);
        assert!(satisfied(circuit_for(&jp, &tokyo(), &cond, 1.0)));
    }

    #[test]
    fn unsatisfied_with_wrong_commitment() {
        let mut c = circuit(&tokyo(), &ShippingCondition::default(), 1.0);
        if let Some(public) = c.public.as_mut() {
            public.commitment += Fr::one();
        }
        assert!(!satisfied(c));
    }

    #[test]
    fn public_input_layout() {
        let c = circuit(&tokyo(), &ShippingCondition::default().countries(["JP"]), 1.0);
        let inputs = c.public.as_ref().unwrap().to_vec();
        assert_eq!(inputs.len(), NUM_PUBLIC_INPUTS);
        assert_eq!(NUM_PUBLIC_INPUTS, 44);
        assert_eq!(inputs[3], country_value(&tokyo()));
        // The Locality PID discloses admin1.
        assert_eq!(inputs[4], Fr::one());
        assert_eq!(inputs[5], region_value(&tokyo()));
        // Country flag set, region flag clear, weight unrestricted.
        assert_eq!(inputs[6], Fr::one());
        assert_eq!(inputs[23], Fr::zero());
        assert_eq!(inputs[40], Fr::from(u64::MAX));

        let cs = ConstraintSystem::<Fr>::new_ref();
        c.generate_constraints(cs.clone()).unwrap();
        // Instance variables include the constant one.
        assert_eq!(cs.num_instance_variables(), NUM_PUBLIC_INPUTS + 1);
    }

    #[test]
    fn constraint_count_is_bounded() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit(&tokyo(), &ShippingCondition::default(), 1.0)
            .generate_constraints(cs.clone())
            .unwrap();
        let n = cs.num_constraints();
        assert!(n > 4 * RANGE_BITS, "too few constraints ({n})");
        assert!(n < 1000, "too many constraints ({n})");
    }
}
