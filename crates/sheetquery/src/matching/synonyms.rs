//! Multilingual synonym clusters for common business columns.
//!
//! Membership is bidirectional: every term of a cluster is a synonym of
//! every other term of the same cluster.

use once_cell::sync::Lazy;

use super::text::normalize;

/// The business concept a synonym cluster stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConceptKind {
    Vendor,
    Customer,
    Amount,
    Price,
    Quantity,
    Date,
    Email,
    Phone,
    Product,
    Invoice,
    Status,
    Category,
    Description,
    Name,
    Address,
    Region,
}

impl ConceptKind {
    /// Canonical English term for the concept.
    pub fn canonical(&self) -> &'static str {
        match self {
            ConceptKind::Vendor => "vendor",
            ConceptKind::Customer => "customer",
            ConceptKind::Amount => "amount",
            ConceptKind::Price => "price",
            ConceptKind::Quantity => "quantity",
            ConceptKind::Date => "date",
            ConceptKind::Email => "email",
            ConceptKind::Phone => "phone",
            ConceptKind::Product => "product",
            ConceptKind::Invoice => "invoice",
            ConceptKind::Status => "status",
            ConceptKind::Category => "category",
            ConceptKind::Description => "description",
            ConceptKind::Name => "name",
            ConceptKind::Address => "address",
            ConceptKind::Region => "region",
        }
    }
}

const CLUSTERS: &[(ConceptKind, &[&str])] = &[
    (
        ConceptKind::Vendor,
        &[
            "vendor", "supplier", "provider", "seller", "merchant", "payee", "proveedor",
            "vendedor", "fournisseur", "lieferant", "anbieter", "fornecedor", "поставщик",
            "продавец", "供应商", "卖方", "仕入先", "業者", "ベンダー",
        ],
    ),
    (
        ConceptKind::Customer,
        &[
            "customer", "client", "buyer", "cliente", "comprador", "acheteur", "kunde",
            "käufer", "клиент", "покупатель", "客户", "顾客", "顧客", "得意先",
        ],
    ),
    (
        ConceptKind::Amount,
        &[
            "amount", "total", "sum", "value", "payment", "importe", "monto", "pago", "valor",
            "montant", "paiement", "somme", "betrag", "summe", "zahlung", "gesamt",
            "pagamento", "сумма", "платеж", "итого", "金额", "总计", "付款", "金額", "合計",
        ],
    ),
    (
        ConceptKind::Price,
        &[
            "price", "cost", "unit price", "precio", "costo", "prix", "coût", "preis",
            "kosten", "preço", "цена", "стоимость", "价格", "単価", "価格",
        ],
    ),
    (
        ConceptKind::Quantity,
        &[
            "quantity", "qty", "units", "cantidad", "quantité", "menge", "anzahl",
            "quantidade", "количество", "数量",
        ],
    ),
    (
        ConceptKind::Date,
        &[
            "date", "day", "timestamp", "fecha", "día", "jour", "datum", "дата", "日期",
            "日付",
        ],
    ),
    (
        ConceptKind::Email,
        &[
            "email", "e-mail", "mail", "email address", "correo", "courriel", "почта",
            "邮箱", "电子邮件", "メール",
        ],
    ),
    (
        ConceptKind::Phone,
        &[
            "phone", "telephone", "tel", "mobile", "phone number", "teléfono", "celular",
            "téléphone", "telefon", "telefone", "телефон", "电话", "電話",
        ],
    ),
    (
        ConceptKind::Product,
        &[
            "product", "item", "sku", "article", "producto", "artículo", "produit", "produkt",
            "artikel", "produto", "товар", "продукт", "产品", "商品", "製品",
        ],
    ),
    (
        ConceptKind::Invoice,
        &[
            "invoice", "bill", "receipt", "factura", "recibo", "facture", "rechnung",
            "fatura", "счет", "накладная", "发票", "請求書",
        ],
    ),
    (
        ConceptKind::Status,
        &["status", "state", "estado", "statut", "état", "zustand", "статус", "状态", "状態"],
    ),
    (
        ConceptKind::Category,
        &[
            "category", "type", "class", "categoría", "tipo", "catégorie", "kategorie",
            "categoria", "категория", "类别", "分类", "カテゴリ",
        ],
    ),
    (
        ConceptKind::Description,
        &[
            "description", "details", "notes", "memo", "descripción", "concepto", "notas",
            "libellé", "beschreibung", "bemerkung", "descrição", "описание", "描述", "説明",
            "備考",
        ],
    ),
    (
        ConceptKind::Name,
        &[
            "name", "full name", "nombre", "nom", "nome", "имя", "название", "名称", "姓名",
            "名前",
        ],
    ),
    (
        ConceptKind::Address,
        &[
            "address", "street", "city", "dirección", "domicilio", "adresse", "anschrift",
            "endereço", "адрес", "地址", "住所",
        ],
    ),
    (
        ConceptKind::Region,
        &[
            "region", "country", "zone", "país", "pays", "land", "região", "регион", "страна",
            "地区", "国家", "地域",
        ],
    ),
];

/// Clusters with every term normalized once.
static NORMALIZED: Lazy<Vec<(ConceptKind, Vec<String>)>> = Lazy::new(|| {
    CLUSTERS
        .iter()
        .map(|(kind, terms)| (*kind, terms.iter().map(|t| normalize(t)).collect()))
        .collect()
});

/// Kind of the cluster a concept belongs to (exact normalized membership).
pub fn concept_kind(concept: &str) -> Option<ConceptKind> {
    let target = normalize(concept);
    NORMALIZED
        .iter()
        .find(|(_, terms)| terms.iter().any(|t| *t == target))
        .map(|(kind, _)| *kind)
}

/// Kind of a concept, falling back to its words from last to first so the
/// head noun decides (`"vendor name"` → `Name`).
pub fn concept_kind_loose(concept: &str) -> Option<ConceptKind> {
    if let Some(kind) = concept_kind(concept) {
        return Some(kind);
    }
    let target = normalize(concept);
    target.split(' ').rev().find_map(concept_kind)
}

/// Normalized synonyms of a concept, excluding the concept itself.
pub fn synonyms(concept: &str) -> Vec<String> {
    let target = normalize(concept);
    NORMALIZED
        .iter()
        .filter(|(_, terms)| terms.iter().any(|t| *t == target))
        .flat_map(|(_, terms)| terms.iter().filter(|t| **t != target).cloned())
        .collect()
}

/// All clusters, for dictionary scans over free text.
pub fn clusters() -> impl Iterator<Item = (ConceptKind, &'static [&'static str])> {
    CLUSTERS.iter().map(|(kind, terms)| (*kind, *terms))
}
