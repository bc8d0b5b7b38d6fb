//! Randomized operation sequences vs model sederhana
//!
//! Model: Vec field dalam urutan insert, masing-masing dengan daftar item.
//! Setelah setiap operasi store harus identik dengan model, dan secara
//! berkala harus lolos flatten -> unflatten tanpa perubahan.

use flatmsg::{MessageError, MessageStore, StoreConfig, TypeCode};

const NAMES: [&str; 8] = ["alpha", "beta", "gamma", "delta", "e", "zeta", "eta", "theta"];

#[derive(Debug, Clone)]
struct ModelField {
    name: String,
    type_code: TypeCode,
    fixed: bool,
    items: Vec<Vec<u8>>,
}

#[derive(Debug, Default)]
struct Model {
    fields: Vec<ModelField>,
}

impl Model {
    fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }
}

/// INT32 selalu fixed 4 byte, RAW selalu variable
fn random_item(rng: &mut fastrand::Rng, type_code: TypeCode) -> Vec<u8> {
    let len = if type_code == TypeCode::INT32 {
        4
    } else {
        rng.usize(1..40)
    };
    (0..len).map(|_| rng.u8(..)).collect()
}

fn random_type(rng: &mut fastrand::Rng) -> TypeCode {
    if rng.bool() {
        TypeCode::INT32
    } else {
        TypeCode::RAW
    }
}

fn assert_matches_model(store: &MessageStore, model: &Model) {
    assert_eq!(store.count_names(TypeCode::ANY), model.fields.len());
    assert_eq!(store.is_empty(), model.fields.is_empty());

    for (field, expected) in store.fields().zip(&model.fields) {
        assert_eq!(field.name(), expected.name);
        assert_eq!(field.type_code(), expected.type_code);
        assert_eq!(field.is_fixed_size(), expected.fixed);
        assert_eq!(field.count(), expected.items.len());
        let items: Vec<&[u8]> = field.items().collect();
        let expected_items: Vec<&[u8]> = expected.items.iter().map(Vec::as_slice).collect();
        assert_eq!(items, expected_items, "items of {}", expected.name);
    }

    // lookup lewat hash index harus konsisten dengan urutan
    for expected in &model.fields {
        let last = expected.items.len() - 1;
        assert_eq!(
            store.find_data(&expected.name, expected.type_code, last).unwrap(),
            expected.items[last].as_slice()
        );
    }
    for name in NAMES {
        if model.position(name).is_none() {
            assert!(matches!(
                store.find_data(name, TypeCode::ANY, 0),
                Err(MessageError::NameNotFound)
            ));
        }
    }
}

fn step(rng: &mut fastrand::Rng, store: &mut MessageStore, model: &mut Model) {
    let name = NAMES[rng.usize(..NAMES.len())];
    let existing = model.position(name);

    match rng.u8(..10) {
        // add
        0..=3 => {
            let type_code = random_type(rng);
            let item = random_item(rng, type_code);
            let fixed = type_code == TypeCode::INT32;
            let result = store.add_data(name, type_code, &item, fixed);

            match existing {
                Some(index) if model.fields[index].type_code != type_code => {
                    assert!(matches!(result, Err(MessageError::TypeMismatch)));
                }
                Some(index) => {
                    result.unwrap();
                    model.fields[index].items.push(item);
                }
                None => {
                    result.unwrap();
                    model.fields.push(ModelField {
                        name: name.to_string(),
                        type_code,
                        fixed,
                        items: vec![item],
                    });
                }
            }
        }
        // remove item
        4 | 5 => {
            let item = rng.usize(..3);
            let result = store.remove_data(name, item);
            match existing {
                None => assert!(matches!(result, Err(MessageError::NameNotFound))),
                Some(index) if item >= model.fields[index].items.len() => {
                    assert!(matches!(result, Err(MessageError::BadIndex)));
                }
                Some(index) => {
                    result.unwrap();
                    model.fields[index].items.remove(item);
                    if model.fields[index].items.is_empty() {
                        model.fields.remove(index);
                    }
                }
            }
        }
        // replace item
        6 | 7 => {
            let type_code = random_type(rng);
            let replacement = random_item(rng, type_code);
            let item = rng.usize(..3);
            let result = store.replace_data(name, type_code, item, &replacement);
            match existing {
                None => assert!(matches!(result, Err(MessageError::NameNotFound))),
                Some(index) if model.fields[index].type_code != type_code => {
                    assert!(matches!(result, Err(MessageError::TypeMismatch)));
                }
                Some(index) if item >= model.fields[index].items.len() => {
                    assert!(matches!(result, Err(MessageError::BadIndex)));
                }
                Some(index) => {
                    result.unwrap();
                    model.fields[index].items[item] = replacement;
                }
            }
        }
        // rename
        8 => {
            let new_name = NAMES[rng.usize(..NAMES.len())];
            let result = store.rename(name, new_name);
            match (existing, model.position(new_name)) {
                (None, _) => assert!(matches!(result, Err(MessageError::NameNotFound))),
                (Some(_), _) if name == new_name => result.unwrap(),
                (Some(_), Some(_)) => assert!(matches!(result, Err(MessageError::BadValue(_)))),
                (Some(index), None) => {
                    result.unwrap();
                    model.fields[index].name = new_name.to_string();
                }
            }
        }
        // remove whole field
        _ => {
            let result = store.remove_name(name);
            match existing {
                None => assert!(matches!(result, Err(MessageError::NameNotFound))),
                Some(index) => {
                    result.unwrap();
                    model.fields.remove(index);
                }
            }
        }
    }
}

fn run(seed: u64, steps: usize, config: StoreConfig) {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut store = MessageStore::with_config(u32::from_be_bytes(*b"MODL"), config).unwrap();
    let mut model = Model::default();

    for i in 0..steps {
        step(&mut rng, &mut store, &mut model);
        assert_matches_model(&store, &model);

        if i % 16 == 0 {
            let bytes = store.flatten().unwrap();
            assert_eq!(bytes.len(), store.flattened_size());
            let back = MessageStore::unflatten_with_config(&bytes, config).unwrap();
            assert_eq!(back, store, "seed {} step {}", seed, i);
            assert_matches_model(&back, &model);
        }
    }
}

#[test]
fn test_random_sequences_default_config() {
    for seed in 0..8 {
        run(seed, 400, StoreConfig::default());
    }
}

#[test]
fn test_random_sequences_single_bucket() {
    // semua nama di satu chain
    let config = StoreConfig::default().with_hash_table_size(1);
    for seed in 100..104 {
        run(seed, 400, config);
    }
}

#[test]
fn test_random_sequences_tiny_prealloc() {
    // arena relocate hampir di setiap operasi
    let config = StoreConfig::default()
        .with_max_data_prealloc(1)
        .with_max_field_prealloc(1);
    for seed in 200..204 {
        run(seed, 300, config);
    }
}

#[test]
fn test_make_empty_then_reuse() {
    let mut rng = fastrand::Rng::with_seed(7);
    let mut store = MessageStore::new(1);
    let mut model = Model::default();

    for _ in 0..100 {
        step(&mut rng, &mut store, &mut model);
    }
    store.make_empty();
    model.fields.clear();
    assert_matches_model(&store, &model);
    assert_eq!(store.what, 1);

    for _ in 0..100 {
        step(&mut rng, &mut store, &mut model);
        assert_matches_model(&store, &model);
    }
}
