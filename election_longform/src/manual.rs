/*!

This is the long-form manual for `election_longform` and the `longform` program.

## Input files

The pipeline reads the results of the two rounds of the presidential election,
one file per round, in the layout published by the French Ministry of the
Interior (`resultats-par-niveau-subcom-t1-france-entiere.xlsx` and its `t2`
counterpart):

* 19 commune columns, always named: `Code du département`, `Code de la commune`,
  `Libellé du département`, `Libellé de la commune`, `Etat saisie`, `Inscrits`,
  `Abstentions`, `% Abs/Ins`, `Votants`, `% Vot/Ins`, `Blancs`, `% Blancs/Ins`,
  `% Blancs/Vot`, `Nuls`, `% Nuls/Ins`, `% Nuls/Vot`, `Exprimés`, `% Exp/Ins`,
  `% Exp/Vot`
* one block of 7 columns per candidate: `N°Panneau`, `Sexe`, `Nom`, `Prénom`,
  `Voix`, `% Voix/Ins`, `% Voix/Exp`. Only the first block is named in the
  header, the following ones are left unnamed.

In the 2022 files, the first round ends at column 103 (12 blocks) and the
second round at column 33 (2 blocks). Without `lastColumnIndex`, the layout
ends at the last column that holds data. With it, any data further right in an
unnamed column stops the run; named extra columns are ignored.

The following providers are supported:
* `xlsx` Excel workbooks. The first worksheet is used unless a name is given.
* `csv` delimited text, UTF-8. The delimiter defaults to `;`.

## Candidate keys

Within a round, the key of a candidate is the number of its block. The keys of
the second round are then replaced by the keys of the first round, matching the
candidates by surname and given name (trimmed). The comparison is exact by
default; `caseInsensitive` ignores the case. Accents are never folded: `Eric`
and `Éric` are two different names.

A second-round candidate absent from the first round either stops the run
(`fail`) or receives a new key above all the keys of the first round
(`assignNewKey`, the default).

## Output

One file (`parquet` by default, or `csv`), with the 19 commune columns, the 7
candidate columns, `candidat` (the key) and `tour` (1 or 2). Unused candidate
blocks are kept with empty values: they mean that the candidate did not run in
this commune, not that they received zero votes.

Department and commune codes are always written as text. Numeric codes are
padded with zeros (`2` becomes `02`, and `1` becomes `001` for communes), so
that they can be joined with geographic data.

*/
